use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use guard_proto::ConnectionState;

use crate::output::{CpalOutput, ToneOutput};
use crate::state::{next_alarm_state, AlarmState};
use crate::tone::{AlarmConfig, ToneShape};
use crate::AudioError;

/// Opens the audio output. Called at most once per controller, on a blocking thread.
pub type OutputFactory = Box<dyn FnOnce() -> Result<Box<dyn ToneOutput>, AudioError> + Send>;

type SharedOutput = Arc<Mutex<Box<dyn ToneOutput>>>;

enum OutputSlot {
    Unopened,
    Opening,
    Ready(SharedOutput),
    Unavailable,
}

impl OutputSlot {
    fn is_settled(&self) -> bool {
        matches!(self, OutputSlot::Ready(_) | OutputSlot::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmStats {
    /// SILENT -> ALARMING transitions
    pub activations: u64,
    /// periodic emissions actually cancelled
    pub stops: u64,
    /// pulses handed to the output
    pub pulses: u64,
}

/// Owns the alarm state, the audio output and the pulse timer.
///
/// Must be driven from inside a tokio runtime: starting the alarm spawns the pulse task, and the
/// first start opens the output on the blocking pool so `update` never waits on the device.
pub struct AlarmController {
    cfg: AlarmConfig,
    state: AlarmState,
    factory: Option<OutputFactory>,
    output: Arc<watch::Sender<OutputSlot>>,
    pulse: Option<JoinHandle<()>>,
    pulses: Arc<AtomicU64>,
    activations: u64,
    stops: u64,
    shut_down: bool,
}

impl AlarmController {
    pub fn new(cfg: AlarmConfig, factory: OutputFactory) -> Self {
        Self {
            cfg,
            state: AlarmState::Silent,
            factory: Some(factory),
            output: Arc::new(watch::Sender::new(OutputSlot::Unopened)),
            pulse: None,
            pulses: Arc::new(AtomicU64::new(0)),
            activations: 0,
            stops: 0,
            shut_down: false,
        }
    }

    /// Controller backed by the default cpal output device.
    pub fn with_default_output(cfg: AlarmConfig) -> Self {
        Self::new(
            cfg,
            Box::new(|| CpalOutput::open().map(|o| Box::new(o) as Box<dyn ToneOutput>)),
        )
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// True while a pulse task is alive. A task that gave up on the output no longer counts.
    pub fn is_emitting(&self) -> bool {
        self.pulse.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stats(&self) -> AlarmStats {
        AlarmStats {
            activations: self.activations,
            stops: self.stops,
            pulses: self.pulses.load(Ordering::Relaxed),
        }
    }

    /// Re-evaluates the alarm against the current signals and applies the effects.
    pub fn update(&mut self, connection: ConnectionState, has_frame: bool, condition_met: bool) -> AlarmState {
        match next_alarm_state(connection, has_frame, condition_met, self.state) {
            AlarmState::Alarming => self.start(),
            AlarmState::Silent => self.stop(),
        }
        self.state
    }

    pub fn start(&mut self) {
        if self.shut_down {
            return;
        }
        if self.state == AlarmState::Silent {
            info!("alarm: ALARMING");
            self.activations += 1;
            self.state = AlarmState::Alarming;
        }
        if self.is_emitting() || !self.cfg.enable {
            return;
        }
        self.pulse = None;
        if matches!(*self.output.borrow(), OutputSlot::Unavailable) {
            return;
        }
        self.open_output();

        let shape = self.cfg.shape();
        let period = self.cfg.interval();
        let pulses = self.pulses.clone();
        let slot = self.output.clone();
        self.pulse = Some(tokio::spawn(async move {
            let Some(out) = wait_for_output(&slot).await else {
                return;
            };
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                // first tick completes immediately: the first pulse sounds right away
                ticker.tick().await;
                if let Err(e) = emit(&out, &shape) {
                    warn!("alarm: tone emission failed, continuing visual-only: {}", e);
                    slot.send_replace(OutputSlot::Unavailable);
                    break;
                }
                pulses.fetch_add(1, Ordering::Relaxed);
            }
        }));
        debug!("alarm: pulse timer started ({:?})", period);
    }

    /// Idempotent: stopping while silent has no effect.
    pub fn stop(&mut self) {
        if self.state == AlarmState::Alarming {
            info!("alarm: SILENT");
            self.state = AlarmState::Silent;
        }
        let Some(handle) = self.pulse.take() else {
            return;
        };
        let running = !handle.is_finished();
        handle.abort();
        self.silence_output();
        if running {
            self.stops += 1;
            debug!("alarm: pulse timer cancelled");
        }
    }

    /// Stops emission and releases the audio output for good.
    pub fn shutdown(&mut self) {
        self.stop();
        self.shut_down = true;
        self.factory = None;
        self.output.send_replace(OutputSlot::Unavailable);
        info!("alarm: shut down");
    }

    fn open_output(&mut self) {
        if !matches!(*self.output.borrow(), OutputSlot::Unopened) {
            return;
        }
        let Some(open) = self.factory.take() else {
            self.output.send_replace(OutputSlot::Unavailable);
            return;
        };
        self.output.send_replace(OutputSlot::Opening);
        let slot = self.output.clone();
        tokio::task::spawn_blocking(move || {
            let opened = open();
            // a shutdown while opening wins; the fresh output is dropped here
            slot.send_if_modified(move |s| {
                if !matches!(s, OutputSlot::Opening) {
                    return false;
                }
                *s = match opened {
                    Ok(out) => OutputSlot::Ready(Arc::new(Mutex::new(out))),
                    Err(e) => {
                        warn!("alarm: audio output unavailable, alarm is visual-only: {}", e);
                        OutputSlot::Unavailable
                    }
                };
                true
            });
        });
    }

    fn silence_output(&self) {
        let out = match &*self.output.borrow() {
            OutputSlot::Ready(out) => Some(out.clone()),
            _ => None,
        };
        if let Some(out) = out {
            if let Ok(mut o) = out.lock() {
                o.silence();
            }
        }
    }
}

impl Drop for AlarmController {
    fn drop(&mut self) {
        if let Some(handle) = self.pulse.take() {
            handle.abort();
        }
        self.silence_output();
    }
}

async fn wait_for_output(slot: &watch::Sender<OutputSlot>) -> Option<SharedOutput> {
    let mut rx = slot.subscribe();
    let settled = rx.wait_for(OutputSlot::is_settled).await.ok()?;
    match &*settled {
        OutputSlot::Ready(out) => Some(out.clone()),
        _ => None,
    }
}

fn emit(out: &Mutex<Box<dyn ToneOutput>>, shape: &ToneShape) -> Result<(), AudioError> {
    let mut o = out.lock().map_err(|_| AudioError::Backend("output lock poisoned".into()))?;
    o.play(shape)
}
