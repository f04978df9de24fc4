use std::time::Duration;

use serde::Deserialize;

/// One alarm pulse: a sine tone shaped by a linear attack and an exponential decay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneShape {
    pub frequency_hz: f32,
    pub peak: f32,
    pub attack: Duration,
    /// Time from pulse start at which the decay reaches [`ToneShape::FLOOR`].
    pub decay: Duration,
    pub duration: Duration,
}

impl ToneShape {
    pub const FLOOR: f32 = 0.001;

    pub fn amplitude(&self, t: Duration) -> f32 {
        if t >= self.duration {
            return 0.0;
        }
        let ts = t.as_secs_f32();
        let attack = self.attack.as_secs_f32();
        if ts < attack {
            return self.peak * ts / attack;
        }
        let decay_span = self.decay.as_secs_f32() - attack;
        if decay_span <= 0.0 {
            return Self::FLOOR;
        }
        let progress = ((ts - attack) / decay_span).min(1.0);
        let ratio = (Self::FLOOR / self.peak.max(Self::FLOOR)).powf(progress);
        self.peak.max(Self::FLOOR) * ratio
    }

    pub fn sample(&self, t: Duration) -> f32 {
        let phase = 2.0 * std::f32::consts::PI * self.frequency_hz * t.as_secs_f32();
        self.amplitude(t) * phase.sin()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub enable: bool,
    pub interval_ms: u64,
    pub frequency_hz: f32,
    pub peak: f32,
    pub attack_ms: u64,
    pub decay_ms: u64,
    pub duration_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            enable: true,
            interval_ms: 800,
            frequency_hz: 800.0,
            peak: 0.3,
            attack_ms: 50,
            decay_ms: 500,
            duration_ms: 600,
        }
    }
}

impl AlarmConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn shape(&self) -> ToneShape {
        ToneShape {
            frequency_hz: self.frequency_hz,
            peak: self.peak.clamp(0.0, 1.0),
            attack: Duration::from_millis(self.attack_ms.max(1)),
            decay: Duration::from_millis(self.decay_ms),
            duration: Duration::from_millis(self.duration_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn envelope_rises_then_decays_then_stops() {
        let s = AlarmConfig::default().shape();
        assert_eq!(s.amplitude(ms(0)), 0.0);
        assert!((s.amplitude(ms(25)) - 0.15).abs() < 1e-3);
        assert!((s.amplitude(ms(50)) - 0.3).abs() < 1e-3);
        let mid = s.amplitude(ms(200));
        assert!(mid < 0.3 && mid > ToneShape::FLOOR);
        assert!((s.amplitude(ms(500)) - ToneShape::FLOOR).abs() < 1e-5);
        assert!((s.amplitude(ms(550)) - ToneShape::FLOOR).abs() < 1e-5);
        assert_eq!(s.amplitude(ms(600)), 0.0);
        assert_eq!(s.sample(ms(700)), 0.0);
    }

    #[test]
    fn samples_stay_within_peak() {
        let s = AlarmConfig::default().shape();
        for i in 0..600 {
            assert!(s.sample(Duration::from_micros(i * 1000 + 313)).abs() <= 0.3 + 1e-6);
        }
    }
}
