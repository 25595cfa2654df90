//! Replay a captured transport event stream through the relay engine.
//!
//! Usage: `realtime-replay <capture.jsonl> [config.toml]`
//!
//! Each non-blank line of the capture is one transport event. The final
//! transcript and every outbound command are printed to stdout as JSON;
//! tracing goes to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use realtime_relay::events::decode_line;
use realtime_relay::transport::{ChannelTransport, TransportCommand};
use realtime_relay::{InboundEvent, RelayConfig, SessionLifecycleController, TranscriptStore};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("realtime_relay=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("realtime-replay failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let capture: PathBuf = args
        .next()
        .context("usage: realtime-replay <capture.jsonl> [config.toml]")?
        .into();
    let config = match args.next() {
        Some(path) => RelayConfig::from_file(Path::new(&path))
            .with_context(|| format!("failed to load config from {path}"))?,
        None => RelayConfig::default(),
    };

    let content = std::fs::read_to_string(&capture)
        .with_context(|| format!("failed to read {}", capture.display()))?;

    let mut session = SessionLifecycleController::new(config);
    let (transport, mut commands) = ChannelTransport::new();
    session.connect(transport);

    let mut replayed = 0usize;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match decode_line(line) {
            Ok(event) => {
                session.handle_event(&InboundEvent::Transport(event));
                replayed += 1;
            }
            Err(e) => tracing::warn!(line = index + 1, error = %e, "skipping undecodable line"),
        }
    }
    session.disconnect();
    tracing::info!(replayed, "replay finished");

    let mut sent = Vec::new();
    while let Ok(command) = commands.try_recv() {
        if let TransportCommand::Send(command) = command {
            sent.push(command.to_wire());
        }
    }

    let report = serde_json::json!({
        "transcript": session.transcript().items(),
        "commands": sent,
    });
    let json = serde_json::to_string_pretty(&report).context("failed to encode replay report")?;
    println!("{json}");
    Ok(())
}
