// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! addin-relay: development relay for addin message sync.
//!
//! Groups connections by addin session, stamps every batch with the relay
//! clock, and forwards it to the other members of the session. Keeps one
//! context value per session in memory.

mod server;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use addin_core::SystemClock;

use server::BoxError;
use state::{RelayOptions, RelayState};

/// addin-relay: message relay for collaborative addins
#[derive(Parser, Debug)]
#[command(name = "addin-relay")]
#[command(about = "WebSocket relay for addin message sync")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// Bearer token clients must present
    #[arg(long)]
    token: Option<String>,

    /// Migrate every new connection to this relay base URL
    #[arg(long)]
    redirect_to: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting addin-relay");
    info!("  Bind address: {}", args.bind);
    info!(
        "  Token check: {}",
        if args.token.is_some() { "enabled" } else { "disabled" }
    );
    if let Some(ref target) = args.redirect_to {
        info!("  Redirecting all connections to: {}", target);
    }

    let options = RelayOptions {
        token: args.token,
        redirect_to: args.redirect_to,
    };
    let state = RelayState::new(options, Arc::new(SystemClock));

    server::run(args.bind, state).await
}
