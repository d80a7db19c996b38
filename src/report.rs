//! Console reporting: the pre-run summary, per-request lines, periodic
//! progress, and the final report.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

use crate::config::{Config, RunMode};
use crate::engine::RunStats;
use crate::executor::ResultResponse;
use crate::stats::RunRecorder;
use crate::url::Target;

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Prints the pre-run summary.
pub fn print_test_info(config: &Config, target: &Target) {
    println!("Starting load test:");
    println!("  URL under test: {}", config.target_url);
    match config.run_mode {
        RunMode::Count(count) => {
            println!("  Type of test: request count");
            println!("  Request count input: {}", count);
        }
        RunMode::Duration(duration) => {
            println!("  Type of test: duration");
            println!("  Duration input: {} seconds", duration.as_secs());
        }
    }
    println!("  Workers: {}", config.worker_count);
    println!(
        "  Method: {}",
        if config.post_data.is_some() { "POST" } else { "GET" }
    );
    if target.scheme == crate::url::Scheme::Https {
        println!("  Verify TLS peer: {}", config.tls.verify_peer);
    }
    println!();
}

/// Prints the per-request line. Default mode is one line per request;
/// verbose mode dumps the phase durations, headers and body.
pub fn print_request_line(result: &ResultResponse, verbose: bool) {
    if !verbose {
        println!(
            "Response: {} in {:.3} ms",
            result.reply.status_code,
            ms(result.timings.total_without_dns())
        );
        return;
    }

    let reply = &result.reply;
    let timings = &result.timings;
    println!(
        "Response: {} {} {}",
        reply.http_version, reply.status_code, reply.status_message
    );
    println!(
        "Total duration: {:.3} ms (prepare: {:.3} ms, socket connect: {:.3} ms, handshake: {:.3} ms, request: {:.3} ms, response: {:.3} ms)",
        ms(timings.total_without_dns()),
        ms(timings.prepare),
        ms(timings.connect),
        ms(timings.handshake),
        ms(timings.request),
        ms(timings.response),
    );
    println!("Headers:");
    for (name, value) in &reply.headers {
        println!("  {}: {}", name, value);
    }
    println!("Body:\n{}", String::from_utf8_lossy(&reply.body));
    println!("------------------------------------------------------");
}

/// Prints the final report.
pub fn print_report(config: &Config, stats: &RunStats, recorder: &RunRecorder) {
    let total_seconds = stats.total_wall_duration.as_secs_f64();

    println!();
    println!("Test completed:");
    match config.run_mode {
        RunMode::Count(count) => {
            println!("  Type of test: request count");
            println!("  Request count input: {}", count);
        }
        RunMode::Duration(duration) => {
            println!("  Type of test: duration");
            println!("  Duration input: {} s", duration.as_secs());
        }
    }
    println!(
        "  Total requests executed: {}",
        stats.total_requests_completed
    );

    let failed = recorder.failed();
    if failed > 0 {
        println!("  Failed requests: {}", failed);
        for (category, count) in recorder.failures() {
            println!("    {}: {}", category.description(), count);
        }
    }

    if total_seconds > 0.0 {
        println!(
            "  Average reqs/sec: {:.2}",
            stats.total_requests_completed as f64 / total_seconds
        );
    }
    println!(
        "  Total test duration: {:.4} ms",
        ms(stats.total_wall_duration)
    );

    if let Some(latency) = recorder.latency_stats() {
        println!("  Latency (without DNS): {}", latency.format());
    }
}

/// What the progress monitor measures completion against.
#[derive(Debug, Clone, Copy)]
pub enum ProgressGoal {
    Count(u64),
    Deadline { started: Instant, total: Duration },
}

/// Periodically logs run progress until told to stop. Runs alongside the
/// workers; suppressed entirely in silent mode by the engine.
pub async fn progress_monitor(
    recorder: Arc<RunRecorder>,
    goal: ProgressGoal,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    // The first tick fires immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let completed = recorder.completed();
                let percent = match goal {
                    ProgressGoal::Count(total) if total > 0 => {
                        (completed * 100 / total).min(100)
                    }
                    ProgressGoal::Count(_) => 100,
                    ProgressGoal::Deadline { started, total } => {
                        let elapsed = started.elapsed().as_secs_f64();
                        ((elapsed / total.as_secs_f64()) * 100.0).min(100.0) as u64
                    }
                };
                info!(completed, percent, "progress");
            }
        }
    }
}
