use guard_proto::Detection;

use crate::{policy::LabelPolicy, threshold::Threshold};

/// Per-detection verdict, one for every raw detection in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub detection: Detection,
    /// confidence >= threshold
    pub valid: bool,
    /// label satisfies the positive rule (independent of `valid`)
    pub positive: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Classification {
    pub assessments: Vec<Assessment>,
    /// At least one valid detection is positive.
    pub condition_met: bool,
}

impl Classification {
    pub fn valid(&self) -> impl Iterator<Item = &Assessment> {
        self.assessments.iter().filter(|a| a.valid)
    }

    pub fn valid_detections(&self) -> Vec<Detection> {
        self.valid().map(|a| a.detection.clone()).collect()
    }
}

pub fn classify(detections: &[Detection], threshold: Threshold, policy: &LabelPolicy) -> Classification {
    let t = threshold.value();
    let assessments: Vec<Assessment> = detections
        .iter()
        .map(|d| Assessment {
            detection: d.clone(),
            valid: d.confidence >= t,
            positive: policy.is_positive(&d.label),
        })
        .collect();
    let condition_met = assessments.iter().any(|a| a.valid && a.positive);
    Classification { assessments, condition_met }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_proto::BoundingBox;

    fn det(label: &str, conf: f32) -> Detection {
        Detection::new(label, conf, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    fn t(v: f32) -> Threshold {
        Threshold::new(v).unwrap()
    }

    #[test]
    fn empty_set_is_not_met() {
        let c = classify(&[], Threshold::DEFAULT, &LabelPolicy::default());
        assert!(!c.condition_met);
        assert!(c.valid_detections().is_empty());
    }

    #[test]
    fn confidence_equal_to_threshold_is_valid() {
        let c = classify(&[det("helmet", 0.5)], t(0.5), &LabelPolicy::default());
        assert_eq!(c.valid_detections().len(), 1);
        assert!(c.condition_met);
    }

    #[test]
    fn all_below_threshold_is_not_met() {
        let c = classify(&[det("helmet", 0.49), det("helmet", 0.1)], t(0.5), &LabelPolicy::default());
        assert!(c.valid_detections().is_empty());
        assert!(!c.condition_met);
    }

    #[test]
    fn one_positive_valid_label_is_sufficient() {
        let c = classify(
            &[det("no-helmet", 0.9), det("Motorcycle-Helmet ", 0.7), det("NO-HELMET", 0.95)],
            Threshold::DEFAULT,
            &LabelPolicy::default(),
        );
        assert!(c.condition_met);
    }

    #[test]
    fn only_negated_labels_is_not_met() {
        let c = classify(&[det("no helmet", 0.9), det("NO-HELMET", 0.8)], Threshold::DEFAULT, &LabelPolicy::default());
        assert!(!c.condition_met);
        assert_eq!(c.valid().count(), 2);
    }

    #[test]
    fn invalid_positive_does_not_count() {
        let c = classify(&[det("helmet", 0.2), det("person", 0.9)], Threshold::DEFAULT, &LabelPolicy::default());
        assert!(!c.condition_met);
        // still assessed, for diagnostics
        assert!(c.assessments[0].positive && !c.assessments[0].valid);
    }

    #[test]
    fn empty_labels_do_not_match() {
        let c = classify(&[det("", 0.9), det("   ", 0.9)], Threshold::DEFAULT, &LabelPolicy::default());
        assert!(!c.condition_met);
    }
}
