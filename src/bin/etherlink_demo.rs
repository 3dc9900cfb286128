//! Terminal demo binary exercising the engine from a shell.
//!
//! Demonstration scaffolding only, in the spirit of the teacher's `CLI/`
//! binary (a thin `tokio::main` loop around the same runtime the GUI
//! drives) — not part of the engine's contract (§1 "Out of scope").

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use etherlink_core::event::{DiscoveryStatus, Event, SendBatchRequest, TransferProgressStatus};
use etherlink_core::{spawn_engine, EngineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("etherlink")
        .join("config.toml");

    let config = match EngineConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(_) => {
            println!("using built-in defaults (no usable config at {:?})", config_path);
            EngineConfig::default()
        }
    };

    etherlink_core::logging::init_logging(&config.downloads_dir.join("logs")).ok();

    let (handle, mut events) = spawn_engine(config).await;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    handle.start_discovery().await;
    println!("EtherLink demo started. Commands: list | send <ip> <file> | quit");

    let stdin = tokio::io::stdin();
    let mut reader = tokio::io::BufReader::new(stdin);
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        use tokio::io::AsyncBufReadExt;
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("quit") => break,
            Some("list") => {
                if let Some(dir) = handle.get_downloads_dir().await {
                    println!("downloads directory: {}", dir.display());
                }
            }
            Some("send") => {
                let (Some(address), Some(path)) = (parts.next(), parts.next()) else {
                    println!("usage: send <ip> <file>");
                    continue;
                };
                let request = SendBatchRequest {
                    batch_id: None,
                    peer_addresses: vec![address.to_string()],
                    file_paths: vec![PathBuf::from(path)],
                };
                match handle.send_batch(request).await {
                    Ok(id) => println!("batch started: {id}"),
                    Err(e) => println!("send failed: {e}"),
                }
            }
            _ => println!("unknown command"),
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::PeerDiscovered(peer) => {
            println!("peer discovered: {} ({})", peer.display_name, peer.address)
        }
        Event::PeersCleared => println!("peer table cleared"),
        Event::DiscoveryStatus(DiscoveryStatus::AdvancedScanning) => {
            println!("discovery: running subnet sweep")
        }
        Event::DiscoveryStatus(DiscoveryStatus::Idle) => println!("discovery: idle"),
        Event::TransferProgress {
            filename,
            status,
            progress_pct,
            speed_mb_s,
            ..
        } => {
            let verb = match status {
                TransferProgressStatus::Connecting => "connecting",
                TransferProgressStatus::Sending => "sending",
                TransferProgressStatus::Receiving => "receiving",
            };
            println!("{verb} {filename}: {progress_pct}% ({speed_mb_s:.2} MB/s)");
        }
        Event::TransferComplete { filename, .. } => println!("transfer complete: {filename}"),
        Event::TransferError { transfer_id, error } => {
            println!("transfer {transfer_id} failed: {error}")
        }
        Event::InterfacesChanged => println!("network interfaces changed"),
        Event::Log(log) => println!("[{}] {}", log.level, log.message),
    }
}
