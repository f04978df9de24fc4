use anyhow::Result;
use tracing::{info, warn};

use crate::tone::AlarmConfig;

pub fn check_alarm(cfg: &AlarmConfig) -> Result<()> {
    anyhow::ensure!(cfg.interval_ms >= 100, "alarm.interval_ms too small; set >= 100");
    anyhow::ensure!(
        cfg.frequency_hz > 20.0 && cfg.frequency_hz < 20_000.0,
        "alarm.frequency_hz out of audible range: {}",
        cfg.frequency_hz
    );
    anyhow::ensure!(cfg.peak > 0.0 && cfg.peak <= 1.0, "alarm.peak must be in (0, 1]");
    anyhow::ensure!(cfg.attack_ms < cfg.decay_ms, "alarm.attack_ms must be shorter than alarm.decay_ms");
    anyhow::ensure!(cfg.decay_ms <= cfg.duration_ms, "alarm.decay_ms must not exceed alarm.duration_ms");
    if cfg.duration_ms > cfg.interval_ms {
        warn!("doctor: alarm pulses ({}ms) overlap the interval ({}ms)", cfg.duration_ms, cfg.interval_ms);
    }
    Ok(())
}

/// A missing device only degrades the alarm to visual-only, so this never fails.
pub fn check_output(cfg: &AlarmConfig) {
    if !cfg.enable {
        info!("doctor: alarm disabled, skipping audio probe");
        return;
    }
    match crate::probe_output_device() {
        Ok(name) => info!("doctor: audio output {}", name),
        Err(e) => warn!("doctor: {}; alarm will be visual-only", e),
    }
}
