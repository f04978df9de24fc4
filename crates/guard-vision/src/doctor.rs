use anyhow::Result;
use std::path::Path;

use crate::overlay::{builtin_font, load_font, OverlayConfig};
use crate::DetectionConfig;

pub fn check_font(cfg: &OverlayConfig) -> Result<()> {
    match &cfg.font_path {
        Some(font) => load_font(font).map(|_| ()),
        None => builtin_font().map(|_| ()),
    }
}

pub fn check_overlay(cfg: &OverlayConfig) -> Result<()> {
    anyhow::ensure!(cfg.font_size >= 6.0, "overlay.font_size too small; set >= 6");
    anyhow::ensure!(cfg.stroke_width >= 1, "overlay.stroke_width must be >= 1");
    if let Some(snap) = &cfg.snapshot_path {
        let dir = match Path::new(snap).parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        anyhow::ensure!(dir.is_dir(), "overlay.snapshot_path directory missing: {}", dir.display());
        anyhow::ensure!(cfg.snapshot_interval_ms >= 100, "overlay.snapshot_interval_ms too small; set >= 100");
    }
    Ok(())
}

pub fn check_detection(cfg: &DetectionConfig) -> Result<()> {
    anyhow::ensure!(
        cfg.policy.keywords.iter().any(|k| !k.trim().is_empty()),
        "detection.policy.keywords is empty; nothing can count as a helmet"
    );
    Ok(())
}
