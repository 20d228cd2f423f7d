use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::{info, warn};

use swingbridge_discovery::local::LocalCentral;
use swingbridge_discovery::{Session, SharedCentral};
use swingbridge_domain::config::{DeviceSelection, SessionConfig};
use swingbridge_domain::event::{SessionEvent, SessionEventKind};
use swingbridge_domain::message::{ConnectionStatus, DecodedMessage};
use swingbridge_domain::profile::DeviceModel;
use swingbridge_sinks::history::jsonl::JsonLinesEventSink;
use swingbridge_sinks::history::{EventSink, noop::NoopEventSink};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Model {
    Mlm2pro,
    R10,
}

impl From<Model> for DeviceModel {
    fn from(model: Model) -> DeviceModel {
        match model {
            Model::Mlm2pro => DeviceModel::Mlm2Pro,
            Model::R10 => DeviceModel::R10,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// launch monitor to connect to
    #[arg(short, long, default_value = "mlm2pro")]
    model: Model,

    /// exact advertised name (required for the R10)
    #[arg(short, long)]
    name: Option<String>,

    /// JSON file with session settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// path to a JSON lines file to record events to
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// how long to scan before giving up, e.g. "40s"
    #[arg(short, long, value_parser = humantime::parse_duration)]
    scan_timeout: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    device: Option<DeviceSelection>,
    session: SessionConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let (selection, config) = settings(&args)?;
    let mut sink = sink(args.log.as_deref()).await?;
    let result = run(&mut sink, selection, config).await;
    sink.close().await.map_err(|e| anyhow!("closing event log: {e}"))?;
    result
}

fn settings(args: &Args) -> anyhow::Result<(DeviceSelection, SessionConfig)> {
    let file = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => ConfigFile::default(),
    };
    let mut selection = file.device.unwrap_or(DeviceSelection {
        model: args.model.into(),
        name: None,
    });
    if args.name.is_some() {
        selection.name = args.name.clone();
    }
    if selection.model == DeviceModel::R10 && selection.name.is_none() {
        return Err(anyhow!("the R10 needs --name with its advertised name"));
    }
    let mut config = file.session;
    if let Some(timeout) = args.scan_timeout {
        config.scan_timeout_secs = timeout.as_secs().max(1);
    }
    config.validate().context("invalid session settings")?;
    Ok((selection, config))
}

async fn sink(path: Option<&Path>) -> anyhow::Result<Box<dyn EventSink>> {
    match path {
        Some(path) => JsonLinesEventSink::create_from_file(path)
            .await
            .map_err(|e| anyhow!("opening {}: {e}", path.display())),
        None => Ok(Box::<NoopEventSink>::default()),
    }
}

async fn run(
    sink: &mut Box<dyn EventSink>,
    selection: DeviceSelection,
    config: SessionConfig,
) -> anyhow::Result<()> {
    let central = SharedCentral::new(LocalCentral::new().await?);
    let (session, mut events) = Session::new(central, selection, config);
    let handle = session.connect_device().await?;
    info!(%handle, "connected, waiting for shots");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event);
                if let Err(error) = sink.save(std::slice::from_ref(&event)).await {
                    warn!(%error, "failed to record event");
                }
                if event.kind == SessionEventKind::Status(ConnectionStatus::Disconnected) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                session.disconnect().await;
                break;
            }
        }
    }
    Ok(())
}

fn print_event(event: &SessionEvent) {
    let at = event.at.format("%H:%M:%S%.3f");
    match &event.kind {
        SessionEventKind::Message(DecodedMessage::ShotMeasurement(shot)) => {
            let ball = shot.ball_data();
            println!(
                "{at} shot: ball {:.1} mph, club {}, launch {:.1}°, direction {:.1}°, spin {:.0} rpm, axis {:.1}°",
                ball.ball_speed_mph,
                ball.club_speed_mph
                    .map_or_else(|| "-".to_string(), |speed| format!("{speed:.1} mph")),
                ball.vla_deg,
                ball.hla_deg,
                ball.total_spin_rpm,
                ball.spin_axis_deg,
            );
        }
        SessionEventKind::Message(DecodedMessage::HeartbeatAck) => {}
        SessionEventKind::Message(message) => println!("{at} {message:?}"),
        SessionEventKind::Status(status) => println!("{at} status: {status:?}"),
        SessionEventKind::Error(fault) => println!("{at} error: {fault}"),
    }
}
