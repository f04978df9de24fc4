mod config;
mod input;
mod monitor;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use guard_alarm::{doctor as alarm_doctor, AlarmController};
use guard_proto::decode_message;
use guard_stream::doctor as stream_doctor;
use guard_vision::diagnostics::DiagnosticsPanel;
use guard_vision::{classify, decode_frame, doctor as vision_doctor, BoxCategory, Overlay};

use crate::config::{load_config, Config};
use crate::monitor::Monitor;

#[derive(Debug, Parser)]
#[command(name = "helmetguard", version, about = "HelmetGuard - live helmet compliance monitor")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and probe the audio device.
    Doctor,
    /// Connect to the detection stream and monitor it.
    Run,
    /// Classify and render one saved stream message.
    Replay {
        #[arg(long)]
        input: String,
        #[arg(long, default_value = "replay.png")]
        output: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    // stdin reads park a blocking thread that cannot be cancelled; don't wait on it at exit
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    let res = rt.block_on(async {
        match cli.cmd {
            Command::Doctor => doctor(&cfg).await,
            Command::Run => run(cfg).await,
            Command::Replay { input, output } => replay(&cfg, &input, &output).await,
        }
    });
    rt.shutdown_timeout(Duration::from_millis(200));
    res
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    stream_doctor::check_endpoint(&cfg.stream.endpoint)?;
    stream_doctor::check_timeouts(cfg.stream.connect_timeout_ms, cfg.stream.channel_capacity)?;
    vision_doctor::check_detection(&cfg.detection)?;
    vision_doctor::check_overlay(&cfg.overlay)?;
    vision_doctor::check_font(&cfg.overlay).or_else(|e| {
        warn!("doctor: {:#}; the built-in font will be used", e);
        Ok::<(), anyhow::Error>(())
    })?;
    alarm_doctor::check_alarm(&cfg.alarm)?;
    alarm_doctor::check_output(&cfg.alarm);

    info!(
        "doctor: threshold {}, policy {:?} keywords={:?}",
        cfg.detection.threshold, cfg.detection.policy.mode, cfg.detection.policy.keywords
    );
    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: Config) -> Result<()> {
    info!("run: starting, stream {}", cfg.stream.endpoint);
    let overlay = Overlay::new(cfg.overlay.clone()).context("overlay init")?;
    let alarm = AlarmController::with_default_output(cfg.alarm.clone());
    let monitor = Monitor::new(cfg.detection.clone(), overlay, alarm);
    monitor.run(cfg.stream.clone()).await
}

async fn replay(cfg: &Config, input: &str, output: &str) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("read {}", input))?;
    let msg = decode_message(&text, 1).with_context(|| format!("decode message {}", input))?;
    let classification = classify(&msg.detections, cfg.detection.threshold, &cfg.detection.policy);

    let image = tokio::task::spawn_blocking(move || decode_frame(&msg.jpeg))
        .await
        .context("decode task")??;
    let mut overlay = Overlay::new(cfg.overlay.clone()).context("overlay init")?;
    let report = overlay.render(&image, &classification);
    overlay.save_snapshot(Path::new(output))?;

    print!("{}", DiagnosticsPanel::new(&classification));
    println!(
        "rendered {}x{}: {} helmet box(es), {} other box(es) -> {}",
        report.width,
        report.height,
        report.count(BoxCategory::Helmet),
        report.count(BoxCategory::Other),
        output
    );
    Ok(())
}
