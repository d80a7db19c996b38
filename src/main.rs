use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

use stampede::config::Config;
use stampede::engine;
use stampede::report;
use stampede::url::Target;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Required environment variables:");
    eprintln!(
        "  TARGET_URL              - The URL to load test (https is assumed when the scheme is omitted)"
    );
    eprintln!();
    eprintln!("Run mode (exactly one must be set):");
    eprintln!("  REQUEST_COUNT           - Total number of requests to issue");
    eprintln!("  TEST_DURATION           - Time-boxed run: 30s, 10m, 2h, or bare seconds");
    eprintln!();
    eprintln!("Optional environment variables:");
    eprintln!("  POST_DATA               - JSON body; when set, requests use POST");
    eprintln!(
        "  NUM_WORKERS             - Concurrent workers (default: hardware concurrency, fallback 4)"
    );
    eprintln!();
    eprintln!("TLS configuration:");
    eprintln!("  SKIP_TLS_VERIFY         - Accept any certificate (default: false)");
    eprintln!("  TLS_DEBUG_VERIFY        - Log every certificate in the chain during verification");
    eprintln!(
        "  TLS_OVERRIDE_VERIFY     - With TLS_DEBUG_VERIFY, accept a failed verification (logged)"
    );
    eprintln!("  TLS_VERSIONS            - Allowed TLS versions, subset of '1.2,1.3' (default both)");
    eprintln!();
    eprintln!("Output:");
    eprintln!("  SILENT                  - Suppress everything but fatal errors");
    eprintln!("  VERBOSE                 - Per-request phase durations, headers and body");
}

fn init_tracing(silent: bool, verbose: bool) {
    let default_level = if silent {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    // Load configuration from environment variables
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    init_tracing(config.silent, config.verbose);

    // A URL that does not decompose, or an unsupported scheme, aborts here:
    // no requests are issued for a broken configuration.
    let target = match Target::parse(&config.target_url) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if !config.silent {
        report::print_test_info(&config, &target);
    }

    let (stats, recorder) = engine::run(&config, &target).await;

    if !config.silent {
        report::print_report(&config, &stats, &recorder);
    }
}
