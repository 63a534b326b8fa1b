use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::active_queue::ActiveQueue;
use crate::config::Cli;
use crate::directory::Directory;
use crate::error::BrokerError;
use crate::metrics::MetricsCounters;
use crate::rate_limiter::RateLimiter;
use crate::shutdown::StopFlag;
use crate::{BUF, handler, metrics, scheduler};

/// Binds the listener, wires up the Peer Directory / Active-Peer Queue /
/// Scheduler / Rate Limiter / Metrics Sampler, and runs the accept loop
/// until a termination signal is observed. Returns once every Handler has
/// drained and the Scheduler has stopped.
pub fn run(cli: &Cli, stop: StopFlag) -> Result<(), BrokerError> {
    let listener = TcpListener::bind(("0.0.0.0", cli.port)).map_err(BrokerError::Bind)?;
    listener.set_nonblocking(true).map_err(BrokerError::Bind)?;
    tracing::info!(port = cli.port, "broker listening");

    let directory = Arc::new(Directory::new());
    let active = Arc::new(ActiveQueue::new());
    let metrics_counters = Arc::new(MetricsCounters::default());
    let rate_limiter = cli.rate_limiter_config().map(RateLimiter::new).map(Arc::new);

    // The Scheduler gets its own stop signal, armed only once every Handler
    // has drained and exited (see below) — it must never observe the
    // accept loop's `stop` directly, or it can exit while a Handler is
    // still mid-flight between reading a frame and pushing it to its
    // out_queue, stranding that Handler in `wait_drained` forever.
    let scheduler_stop = StopFlag::new_unarmed();

    thread::scope(|scope| {
        if let Some(limiter) = &rate_limiter {
            let limiter = Arc::clone(limiter);
            let stop = stop.clone();
            scope.spawn(move || limiter.run_decay(&stop));
        }

        if let Some(log_file) = &cli.log_file {
            let directory = Arc::clone(&directory);
            let counters = Arc::clone(&metrics_counters);
            let stop = stop.clone();
            let path = log_file.clone();
            scope.spawn(move || {
                if let Err(e) = metrics::run(&path, &directory, &counters, &stop) {
                    tracing::error!(error = %e, "metrics sampler stopped early");
                }
            });
        }

        {
            let directory = Arc::clone(&directory);
            let active = Arc::clone(&active);
            let rate_limiter = rate_limiter.clone();
            let metrics_counters = Arc::clone(&metrics_counters);
            let scheduler_stop = scheduler_stop.clone();
            scope.spawn(move || {
                scheduler::run(&directory, &active, rate_limiter.as_ref(), &metrics_counters, &scheduler_stop);
            });
        }

        // Handler threads are spawned in this same scope, not a nested one:
        // shutdown_all_peers below must run without first waiting for them
        // to join, since it's what makes them observe EOF and exit. Their
        // handles are collected so we can explicitly join every one of them
        // before telling the Scheduler it may stop.
        let mut handler_handles = Vec::new();
        loop {
            if stop.is_set() {
                break;
            }
            match listener.accept() {
                Ok((conn, _)) => {
                    if let Err(e) = conn.set_nonblocking(false) {
                        tracing::warn!(error = %e, "failed to switch accepted socket to blocking mode");
                        continue;
                    }
                    let directory = Arc::clone(&directory);
                    let active = Arc::clone(&active);
                    let handle = scope.spawn(move || {
                        if let Err(e) = handler::run(conn, &directory, &active, BUF) {
                            tracing::warn!(error = %e, "handler exited with error");
                        }
                    });
                    handler_handles.push(handle);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }

        tracing::info!("shutdown signal received, draining connections");
        shutdown_all_peers(&directory);

        for handle in handler_handles {
            let _ = handle.join();
        }

        // Every Handler has drained its Peer's out_queue and removed itself
        // from the Directory by the time its handle joins, so the
        // Active-Peer Queue is now guaranteed empty — only now is it safe
        // to let the Scheduler stop.
        tracing::info!("all handlers drained, stopping scheduler");
        scheduler_stop.trigger();
        active.notify_shutdown();

        // Falling off the end of `scope` joins the rate limiter, metrics
        // sampler and the scheduler.
    });

    tracing::info!("broker shutdown complete");
    Ok(())
}

fn shutdown_all_peers(directory: &Directory) {
    for peer in directory.snapshot_all() {
        peer.shutdown_socket();
    }
}
