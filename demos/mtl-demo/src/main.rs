use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use mtl_client::Service;

/// Synthetic traffic generator for an MTL broker, standing in for the
/// original `demo_client` test-mode driver and `message_generator`.
///
/// `mtl-demo <broker_host> <broker_port> <local_port> <dest_host> <dest_port> <rate_per_sec> <duration_secs>`
#[derive(Parser, Debug)]
#[command(name = "mtl-demo", about = "MTL synthetic traffic generator")]
struct Cli {
    broker_host: String,
    broker_port: u16,
    /// Local port to bind before connecting; 0 lets the kernel choose.
    local_port: u16,
    dest_host: String,
    dest_port: u16,
    rate_per_sec: f64,
    duration_secs: u64,
}

fn resolve_v4(host: &str, port: u16) -> Option<Ipv4Addr> {
    (host, port)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr { SocketAddr::V4(v4) => Some(*v4.ip()), SocketAddr::V6(_) => None })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let Some(broker_ip) = resolve_v4(&cli.broker_host, cli.broker_port) else {
        tracing::error!(host = %cli.broker_host, "could not resolve broker host to an IPv4 address");
        return ExitCode::FAILURE;
    };
    let Some(dest_ip) = resolve_v4(&cli.dest_host, cli.dest_port) else {
        tracing::error!(host = %cli.dest_host, "could not resolve destination host to an IPv4 address");
        return ExitCode::FAILURE;
    };
    if cli.rate_per_sec <= 0.0 {
        tracing::error!(rate = cli.rate_per_sec, "rate_per_sec must be positive");
        return ExitCode::FAILURE;
    }

    let broker_addr = SocketAddrV4::new(broker_ip, cli.broker_port);
    let mut service = match Service::connect(broker_addr, cli.local_port) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to broker");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(local_addr = %service.local_addr(), broker = %broker_addr, "connected");

    let delivered_count = Arc::new(AtomicU64::new(0));
    let delivered_for_cb = Arc::clone(&delivered_count);
    if let Err(e) = service.start(move |src, data| {
        delivered_for_cb.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(from = %src, len = data.len(), "message received");
    }) {
        tracing::error!(error = %e, "failed to start service");
        return ExitCode::FAILURE;
    }

    let interval = Duration::from_secs_f64(1.0 / cli.rate_per_sec);
    let deadline = Instant::now() + Duration::from_secs(cli.duration_secs);
    let mut submitted: u64 = 0;
    while Instant::now() < deadline {
        let payload = submitted.to_be_bytes();
        match service.schedule(dest_ip, cli.dest_port, &payload) {
            Ok(()) => submitted += 1,
            Err(e) => {
                tracing::warn!(error = %e, "stopped submitting traffic");
                break;
            }
        }
        thread::sleep(interval);
    }

    // Give in-flight sends and their NACKs a moment to settle before we
    // tally final counts and tear the connection down.
    thread::sleep(Duration::from_millis(200));

    let sent = service.sent_count();
    let nacked = service.nacked_count();
    // No positive acknowledgement exists on the wire for a message that
    // reached its destination, only a NACK for one that didn't.
    let delivered = sent.saturating_sub(nacked);
    tracing::info!(
        submitted,
        sent,
        nacked,
        delivered,
        delivered_to_us = delivered_count.load(Ordering::Relaxed),
        "demo run complete"
    );

    service.stop();
    ExitCode::SUCCESS
}
