//! Standalone world server binary.
//!
//! Usage:
//!   cargo run -p terra_server -- [--tcp-port 40100] [--udp-port 40101]
//!       [--tick-ms 40] [--seed 0]
//!
//! The server accepts client connections, streams procedurally generated
//! terrain, and synchronizes player and item state at a fixed tick rate.
//!
//! Console commands:
//!   end         - graceful shutdown
//!   clear       - clear the screen
//!   spawn_item  - drop a test item into the world
//!   show_debug  - log received packets
//!   hide_debug  - stop logging received packets
//!   online      - list connected player count

use std::env;
use std::io::BufRead;

use anyhow::Context;
use terra_server::server::WorldServer;
use terra_shared::config::ServerConfig;
use terra_shared::items::ItemCatalog;
use terra_shared::math::Vec3;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> ServerConfig {
    let mut cfg = ServerConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tcp-port" if i + 1 < args.len() => {
                cfg.tcp_port = args[i + 1].parse().unwrap_or(cfg.tcp_port);
                i += 2;
            }
            "--udp-port" if i + 1 < args.len() => {
                cfg.udp_port = args[i + 1].parse().unwrap_or(cfg.udp_port);
                i += 2;
            }
            "--tick-ms" if i + 1 < args.len() => {
                cfg.tick_delay_ms = args[i + 1].parse().unwrap_or(cfg.tick_delay_ms);
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.world_seed = args[i + 1].parse().unwrap_or(cfg.world_seed);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(
        tcp_port = cfg.tcp_port,
        udp_port = cfg.udp_port,
        tick_ms = cfg.tick_delay_ms,
        seed = cfg.world_seed,
        "starting world server"
    );

    let (server, listener) = WorldServer::bind(cfg, ItemCatalog::builtin())
        .await
        .context("bind server")?;

    // Items for poking at the world right after startup.
    server.spawn_item(terra_shared::items::ItemId(1), Vec3::new(3.0, 3.0, 16.0));
    server.spawn_item(terra_shared::items::ItemId(2), Vec3::new(6.0, 3.0, -40.0));

    // Console input arrives from a dedicated blocking thread.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        loop {
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'end' to shut down, 'online' for player count.");
    server.run(listener, console_rx).await
}
