use std::sync::Arc;
use std::time::Instant;

use crate::active_queue::ActiveQueue;
use crate::directory::Directory;
use crate::forwarding;
use crate::metrics::MetricsCounters;
use crate::rate_limiter::RateLimiter;
use crate::shutdown::{StopFlag, sleep_until_or_stop};

/// Single-consumer task draining the Active-Peer Queue one message per
/// turn: strict per-peer round-robin at one-message granularity, no
/// starvation, the Active-Peer lock never held across the socket write.
///
/// Keeps draining pending messages even after `stop` is set — it only
/// exits once the queue is empty, honoring drain-before-destroy for the
/// whole broker during graceful shutdown.
pub fn run(
    directory: &Arc<Directory>,
    active: &Arc<ActiveQueue>,
    rate_limiter: Option<&Arc<RateLimiter>>,
    metrics: &Arc<MetricsCounters>,
    stop: &StopFlag,
) {
    let mut send_target: Option<Instant> = None;

    loop {
        if let Some(limiter) = rate_limiter {
            let period = limiter.next_period();
            let target = send_target.map_or_else(Instant::now, |t| t + period);
            // A stop signal here must not abort the drain; it only cuts
            // pacing short so remaining messages flush faster.
            sleep_until_or_stop(target, stop);
            send_target = Some(target);
        }

        let Some(peer) = active.pop_wait(stop) else {
            break;
        };

        let (frame, still_pending) = peer.pop_front_and_check_pending();
        if still_pending {
            active.push(Arc::clone(&peer));
        }

        if let Some(frame) = frame {
            forwarding::forward(directory, frame, metrics);
        }
    }

    tracing::info!("scheduler drained and stopped");
}
