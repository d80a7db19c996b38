//! The load-generation engine.
//!
//! A fixed pool of `worker_count` tokio tasks; each worker resolves DNS
//! exactly once when its executor is built, then issues its stream of
//! requests strictly sequentially against the resolved endpoint. Nothing
//! is shared between requests except the resolved endpoint and the
//! read-only TLS policy; across workers only the atomic run counters are
//! shared.
//!
//! A run moves through Idle → Resolving (per worker) → Dispatching →
//! Draining → Reported; `run` returns once the pool has drained.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::{Config, RunMode};
use crate::errors::RequestError;
use crate::executor::RequestExecutor;
use crate::report::{self, ProgressGoal};
use crate::request::RequestSpec;
use crate::stats::RunRecorder;
use crate::transport::TlsPolicy;
use crate::url::Target;

/// Aggregate result of a whole run, handed to the reporting collaborator.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    pub total_requests_completed: u64,
    pub total_wall_duration: Duration,
}

/// Per-worker share of the run.
#[derive(Debug, Clone, Copy)]
enum Assignment {
    /// Issue exactly this many requests.
    Count(u64),
    /// Issue requests until the deadline passes; in-flight requests finish
    /// naturally.
    Deadline(Instant),
}

/// Runs the whole load test and returns the aggregate stats together with
/// the shared recorder (for the percentile report).
pub async fn run(config: &Config, target: &Target) -> (RunStats, Arc<RunRecorder>) {
    let recorder = Arc::new(RunRecorder::new());
    let started = Instant::now();

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let monitor = if config.silent {
        None
    } else {
        let goal = match config.run_mode {
            RunMode::Count(total) => ProgressGoal::Count(total),
            RunMode::Duration(total) => ProgressGoal::Deadline { started, total },
        };
        Some(tokio::spawn(report::progress_monitor(
            recorder.clone(),
            goal,
            stop_rx,
        )))
    };

    let mut handles = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count {
        let assignment = match config.run_mode {
            RunMode::Count(total) => {
                Assignment::Count(share(total, config.worker_count, worker_id))
            }
            RunMode::Duration(duration) => Assignment::Deadline(started + duration),
        };
        let context = WorkerContext {
            id: worker_id,
            target: target.clone(),
            post_data: config.post_data.clone(),
            tls_policy: config.tls.clone(),
            recorder: recorder.clone(),
            silent: config.silent,
            verbose: config.verbose,
        };
        handles.push(tokio::spawn(run_worker(context, assignment)));
    }

    // Drain: wait for every dispatched execution to finish.
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task failed");
        }
    }
    let total_wall_duration = started.elapsed();

    let _ = stop_tx.send(true);
    if let Some(monitor) = monitor {
        let _ = monitor.await;
    }

    let stats = RunStats {
        total_requests_completed: recorder.completed(),
        total_wall_duration,
    };
    info!(
        completed = stats.total_requests_completed,
        wall_ms = stats.total_wall_duration.as_millis() as u64,
        "run finished"
    );
    (stats, recorder)
}

/// Splits `total` across the workers so the shares sum exactly to `total`.
fn share(total: u64, workers: usize, worker_id: usize) -> u64 {
    let workers = workers as u64;
    let base = total / workers;
    let remainder = total % workers;
    base + u64::from((worker_id as u64) < remainder)
}

struct WorkerContext {
    id: usize,
    target: Target,
    post_data: Option<String>,
    tls_policy: TlsPolicy,
    recorder: Arc<RunRecorder>,
    silent: bool,
    verbose: bool,
}

async fn run_worker(context: WorkerContext, assignment: Assignment) {
    if let Assignment::Count(0) = assignment {
        return;
    }
    debug!(worker_id = context.id, "worker starting");

    // One DNS resolution per worker; every request reuses the endpoint and
    // every result carries this duration.
    let dns_started = Instant::now();
    let endpoint = match resolve(&context.target).await {
        Ok(endpoint) => endpoint,
        Err(resolve_error) => {
            error!(
                worker_id = context.id,
                error = %resolve_error,
                "DNS resolution failed; worker exiting"
            );
            return;
        }
    };
    let dns = dns_started.elapsed();

    if context.verbose && !context.silent {
        println!(
            "DNS lookup duration (once per worker): {:.3} ms",
            dns.as_secs_f64() * 1000.0
        );
    }

    let spec = RequestSpec::new(context.target.clone(), context.post_data.clone());
    let executor = match RequestExecutor::new(spec, endpoint, dns, &context.tls_policy) {
        Ok(executor) => executor,
        Err(tls_error) => {
            error!(
                worker_id = context.id,
                error = %tls_error,
                "TLS configuration failed; worker exiting"
            );
            return;
        }
    };

    match assignment {
        Assignment::Count(count) => {
            for _ in 0..count {
                step(&context, &executor).await;
            }
        }
        Assignment::Deadline(deadline) => {
            // New dispatch stops at the deadline; the request in flight is
            // allowed to finish.
            while Instant::now() < deadline {
                step(&context, &executor).await;
            }
        }
    }

    debug!(worker_id = context.id, "worker finished");
}

async fn step(context: &WorkerContext, executor: &RequestExecutor) {
    let result = executor.execute().await;
    context.recorder.record(&result);
    if !context.silent {
        report::print_request_line(&result, context.verbose);
    }
}

async fn resolve(target: &Target) -> Result<SocketAddr, RequestError> {
    let mut addrs = lookup_host((target.host.as_str(), target.port()))
        .await
        .map_err(|source| RequestError::Dns {
            host: target.host.clone(),
            source,
        })?;
    addrs.next().ok_or_else(|| RequestError::Dns {
        host: target.host.clone(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"),
    })
}
