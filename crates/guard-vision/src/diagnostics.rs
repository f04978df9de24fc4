//! Read-only views over a [`Classification`] for the status and diagnostics outputs.

use std::fmt;

use crate::classify::Classification;

pub const WEAR_HELMET: &str = "WEAR HELMET";
pub const HELMET_OK: &str = "HELMET DETECTED";

pub fn safety_indicator(c: &Classification) -> &'static str {
    if c.condition_met { HELMET_OK } else { WEAR_HELMET }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticRow {
    pub label: String,
    pub confidence: f32,
    pub valid: bool,
    pub positive: bool,
}

pub struct DiagnosticsPanel<'a> {
    classification: &'a Classification,
}

impl<'a> DiagnosticsPanel<'a> {
    pub fn new(classification: &'a Classification) -> Self {
        Self { classification }
    }

    pub fn rows(&self) -> Vec<DiagnosticRow> {
        self.classification
            .assessments
            .iter()
            .map(|a| DiagnosticRow {
                label: a.detection.label.clone(),
                confidence: a.detection.confidence,
                valid: a.valid,
                positive: a.positive,
            })
            .collect()
    }
}

impl fmt::Display for DiagnosticsPanel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "status: {}", safety_indicator(self.classification))?;
        let rows = self.rows();
        if rows.is_empty() {
            return writeln!(f, "  (no detections)");
        }
        for r in rows {
            writeln!(
                f,
                "  {:<24} {:>4.0}%  valid={:<5} helmet={}",
                format!("{:?}", r.label),
                r.confidence * 100.0,
                r.valid,
                r.positive
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify, LabelPolicy, Threshold};
    use guard_proto::{BoundingBox, Detection};

    #[test]
    fn panel_lists_every_raw_detection() {
        let dets = vec![
            Detection::new("helmet", 0.3, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            Detection::new("no-helmet", 0.8, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
        ];
        let c = classify(&dets, Threshold::DEFAULT, &LabelPolicy::default());
        let panel = DiagnosticsPanel::new(&c);
        let rows = panel.rows();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].positive && !rows[0].valid);
        assert!(!rows[1].positive && rows[1].valid);

        let text = panel.to_string();
        assert!(text.starts_with("status: WEAR HELMET"));
        assert!(text.contains("\"no-helmet\""));
        assert!(text.contains("80%"));
    }

    #[test]
    fn indicator_follows_condition() {
        let mut c = Classification::default();
        assert_eq!(safety_indicator(&c), WEAR_HELMET);
        c.condition_met = true;
        assert_eq!(safety_indicator(&c), HELMET_OK);
    }
}
