use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::DynamicImage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use guard_alarm::AlarmController;
use guard_proto::{ConnectionState, Detection, FrameMessage};
use guard_stream::{StreamClient, StreamConfig, StreamEvent};
use guard_vision::diagnostics::{safety_indicator, DiagnosticsPanel};
use guard_vision::{classify, decode_frame, BoxCategory, Classification, DetectionConfig, LabelPolicy, Overlay, RenderReport, Threshold};

use crate::input::{parse_command, UserCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The current frame: a decoded image and the detections that arrived with it. Classification,
/// indicators, alarm and overlay all derive from this one value.
struct DisplayedFrame {
    seq: u64,
    received_at: time::OffsetDateTime,
    image: DynamicImage,
    detections: Vec<Detection>,
}

struct Decoded {
    seq: u64,
    received_at: time::OffsetDateTime,
    detections: Vec<Detection>,
    result: Result<DynamicImage>,
}

struct DecodeTask {
    seq: u64,
    handle: JoinHandle<()>,
}

/// Ties the stream, classifier, overlay and alarm together. All handlers run to completion
/// on one task; only the image decode leaves it.
pub struct Monitor {
    policy: LabelPolicy,
    threshold: Threshold,
    overlay: Overlay,
    alarm: AlarmController,

    connection: ConnectionState,
    last_seq: u64,
    classification: Classification,
    displayed: Option<DisplayedFrame>,
    last_report: Option<RenderReport>,

    decode_task: Option<DecodeTask>,
    decode_tx: mpsc::UnboundedSender<Decoded>,
    decode_rx: Option<mpsc::UnboundedReceiver<Decoded>>,

    snapshot_path: Option<PathBuf>,
    snapshot_interval: Duration,
    last_snapshot: Option<Instant>,
    shut_down: bool,
}

impl Monitor {
    pub fn new(detection: DetectionConfig, overlay: Overlay, alarm: AlarmController) -> Self {
        let (decode_tx, decode_rx) = mpsc::unbounded_channel();
        let snapshot_path = overlay.config().snapshot_path.as_ref().map(PathBuf::from);
        let snapshot_interval = Duration::from_millis(overlay.config().snapshot_interval_ms);
        Self {
            policy: detection.policy,
            threshold: detection.threshold,
            overlay,
            alarm,
            connection: ConnectionState::Connecting,
            last_seq: 0,
            classification: Classification::default(),
            displayed: None,
            last_report: None,
            decode_task: None,
            decode_tx,
            decode_rx: Some(decode_rx),
            snapshot_path,
            snapshot_interval,
            last_snapshot: None,
            shut_down: false,
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn alarm(&self) -> &AlarmController {
        &self.alarm
    }

    pub fn last_report(&self) -> Option<&RenderReport> {
        self.last_report.as_ref()
    }

    /// A frame counts once its image decoded; messages with broken images never do.
    pub fn has_frame(&self) -> bool {
        self.displayed.is_some()
    }

    /// Runs until Ctrl-C or `quit`, then tears everything down.
    pub async fn run(mut self, stream: StreamConfig) -> Result<()> {
        let (tx, mut events) = mpsc::channel(stream.channel_capacity.max(1));
        let client = tokio::spawn(StreamClient::new(stream).run(tx));
        let mut decoded = self.decode_rx.take().ok_or_else(|| anyhow!("monitor already running"))?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stream_open = true;
        let mut stdin_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!("monitor: threshold {}, type a value, +/-, diag, status or quit", self.threshold);
        loop {
            tokio::select! {
                ev = events.recv(), if stream_open => match ev {
                    Some(ev) => self.handle_stream_event(ev),
                    None => stream_open = false,
                },
                Some(d) = decoded.recv() => self.on_decoded(d),
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        if let Some(cmd) = parse_command(&line) {
                            if self.handle_command(cmd) == Flow::Quit {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("monitor: stdin closed");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("monitor: stdin read failed: {}", e);
                        stdin_open = false;
                    }
                },
                _ = &mut ctrl_c => {
                    info!("monitor: interrupted");
                    break;
                }
            }
        }

        client.abort();
        self.shutdown();
        Ok(())
    }

    pub fn handle_stream_event(&mut self, ev: StreamEvent) {
        if self.shut_down {
            return;
        }
        match ev {
            StreamEvent::State(state) => self.on_connection(state),
            StreamEvent::Frame(frame) => self.on_frame(frame),
        }
    }

    pub fn handle_command(&mut self, cmd: UserCommand) -> Flow {
        match cmd {
            UserCommand::SetThreshold(v) => match Threshold::new(v) {
                Some(t) => self.set_threshold(t),
                None => warn!("monitor: ignoring non-numeric threshold {}", v),
            },
            UserCommand::StepUp => self.set_threshold(self.threshold.step_up()),
            UserCommand::StepDown => self.set_threshold(self.threshold.step_down()),
            UserCommand::Diagnostics => print!("{}", DiagnosticsPanel::new(&self.classification)),
            UserCommand::Status => println!("{}", self.status_line()),
            UserCommand::Quit => return Flow::Quit,
            UserCommand::Unknown(s) => warn!("monitor: unknown command {:?}", s),
        }
        Flow::Continue
    }

    pub fn set_threshold(&mut self, t: Threshold) {
        if t == self.threshold {
            return;
        }
        info!("monitor: threshold {} -> {}", self.threshold, t);
        self.threshold = t;
        if let Some(shown) = &self.displayed {
            let c = classify(&shown.detections, self.threshold, &self.policy);
            self.apply_classification(c, false);
        }
        self.update_alarm();
        self.render_displayed();
    }

    pub fn status_line(&self) -> String {
        let age = self
            .displayed
            .as_ref()
            .map(|l| format!("{}ms", (time::OffsetDateTime::now_utc() - l.received_at).whole_milliseconds()))
            .unwrap_or_else(|| "-".into());
        let boxes = self
            .last_report
            .as_ref()
            .map(|r| format!("{} helmet / {} other", r.count(BoxCategory::Helmet), r.count(BoxCategory::Other)))
            .unwrap_or_else(|| "none".into());
        format!(
            "{} | {} | threshold {} | alarm {:?} | frame #{} age {} | boxes {}",
            self.connection.indicator(),
            if self.has_frame() { safety_indicator(&self.classification) } else { "waiting for video feed" },
            self.threshold,
            self.alarm.state(),
            self.displayed.as_ref().map(|l| l.seq).unwrap_or(0),
            age,
            boxes,
        )
    }

    /// Waits for the in-flight decode (if any) and applies it.
    pub async fn settle(&mut self) {
        while self.decode_task.is_some() {
            let Some(rx) = self.decode_rx.as_mut() else { return };
            let Some(d) = rx.recv().await else { return };
            self.on_decoded(d);
        }
    }

    /// Cancels the pulse timer and any pending decode. Nothing fires afterwards.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.cancel_decode();
        self.alarm.shutdown();
        self.shut_down = true;
        info!("monitor: stopped");
    }

    fn on_connection(&mut self, state: ConnectionState) {
        if state != self.connection {
            info!("monitor: {} ({:?})", state.indicator(), state);
        }
        self.connection = state;
        if state == ConnectionState::Closed {
            self.cancel_decode();
        }
        self.update_alarm();
    }

    /// Nothing is applied until the image decodes: detections are never paired with another
    /// frame's picture.
    fn on_frame(&mut self, frame: FrameMessage) {
        if frame.seq <= self.last_seq {
            debug!("monitor: ignoring out-of-order frame #{}", frame.seq);
            return;
        }
        self.last_seq = frame.seq;
        self.spawn_decode(frame);
    }

    fn apply_classification(&mut self, c: Classification, first: bool) {
        if first || c.condition_met != self.classification.condition_met {
            info!("monitor: {}", safety_indicator(&c));
        }
        self.classification = c;
    }

    fn update_alarm(&mut self) {
        let before = self.alarm.state();
        let after = self.alarm.update(self.connection, self.has_frame(), self.classification.condition_met);
        if before != after {
            debug!("monitor: alarm {:?} -> {:?}", before, after);
        }
    }

    fn spawn_decode(&mut self, frame: FrameMessage) {
        let FrameMessage { seq, received_at, jpeg, detections } = frame;
        if let Some(prev) = self.decode_task.take() {
            prev.handle.abort();
            debug!("monitor: decode of frame #{} superseded by #{}", prev.seq, seq);
        }
        let tx = self.decode_tx.clone();
        let handle = tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || decode_frame(&jpeg)).await {
                Ok(r) => r,
                Err(e) => Err(anyhow!("decode task failed: {}", e)),
            };
            let _ = tx.send(Decoded { seq, received_at, detections, result });
        });
        self.decode_task = Some(DecodeTask { seq, handle });
    }

    fn cancel_decode(&mut self) {
        if let Some(task) = self.decode_task.take() {
            task.handle.abort();
            debug!("monitor: pending decode of frame #{} cancelled", task.seq);
        }
    }

    fn on_decoded(&mut self, d: Decoded) {
        let current = self.decode_task.as_ref().map(|t| t.seq);
        if current != Some(d.seq) {
            debug!("monitor: discarding stale decode of frame #{}", d.seq);
            return;
        }
        self.decode_task = None;
        let image = match d.result {
            Ok(image) => image,
            Err(e) => {
                // previous frame, verdict and alarm stay as they were
                warn!("monitor: dropped frame #{}: {:#}", d.seq, e);
                return;
            }
        };
        let first = self.displayed.is_none();
        let c = classify(&d.detections, self.threshold, &self.policy);
        self.displayed = Some(DisplayedFrame {
            seq: d.seq,
            received_at: d.received_at,
            image,
            detections: d.detections,
        });
        self.apply_classification(c, first);
        self.update_alarm();
        self.render_displayed();
    }

    fn render_displayed(&mut self) {
        let Some(shown) = &self.displayed else { return };
        let report = self.overlay.render(&shown.image, &self.classification);
        debug!("monitor: rendered frame #{} with {} boxes", shown.seq, report.boxes.len());
        self.last_report = Some(report);
        self.maybe_snapshot();
    }

    fn maybe_snapshot(&mut self) {
        let Some(path) = &self.snapshot_path else { return };
        if let Some(t) = self.last_snapshot {
            if t.elapsed() < self.snapshot_interval {
                return;
            }
        }
        self.last_snapshot = Some(Instant::now());
        if let Err(e) = self.overlay.save_snapshot(path) {
            warn!("monitor: snapshot failed: {:#}", e);
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.cancel_decode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use guard_alarm::{AlarmConfig, AlarmState, AudioError, ToneOutput, ToneShape};
    use guard_proto::BoundingBox;
    use guard_vision::OverlayConfig;

    struct CountingOutput(Arc<Mutex<u32>>);

    impl ToneOutput for CountingOutput {
        fn play(&mut self, _shape: &ToneShape) -> Result<(), AudioError> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
        fn silence(&mut self) {}
    }

    fn monitor() -> (Monitor, Arc<Mutex<u32>>) {
        let plays = Arc::new(Mutex::new(0));
        let plays2 = plays.clone();
        let alarm = AlarmController::new(
            AlarmConfig::default(),
            Box::new(move || Ok(Box::new(CountingOutput(plays2)) as Box<dyn ToneOutput>)),
        );
        let overlay = Overlay::new(OverlayConfig::default()).unwrap();
        (Monitor::new(DetectionConfig::default(), overlay, alarm), plays)
    }

    fn jpeg(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(w, h, image::Rgb([120, 120, 120])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    fn frame(seq: u64, bytes: Vec<u8>, label: &str, conf: f32) -> StreamEvent {
        StreamEvent::Frame(FrameMessage {
            seq,
            received_at: time::OffsetDateTime::now_utc(),
            jpeg: bytes,
            detections: vec![Detection::new(label, conf, BoundingBox::new(0.0, 0.0, 10.0, 10.0))],
        })
    }

    fn plays(p: &Arc<Mutex<u32>>) -> u32 {
        *p.lock().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn helmet_then_no_helmet_end_to_end() {
        let (mut m, p) = monitor();
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        m.handle_stream_event(frame(1, jpeg(32, 24), "helmet", 0.9));
        m.settle().await;

        let r = m.last_report().unwrap();
        assert_eq!((r.width, r.height), (32, 24));
        assert_eq!(r.boxes.len(), 1);
        assert_eq!(r.count(BoxCategory::Helmet), 1);
        assert!(m.classification().condition_met);
        assert_eq!(m.alarm().state(), AlarmState::Silent);
        assert_eq!(plays(&p), 0);

        m.handle_stream_event(frame(2, jpeg(32, 24), "no-helmet", 0.8));
        m.settle().await;
        let r = m.last_report().unwrap();
        assert_eq!(r.boxes.len(), 1);
        assert_eq!(r.count(BoxCategory::Other), 1);
        assert!(!m.classification().condition_met);
        assert_eq!(m.alarm().state(), AlarmState::Alarming);
        assert!(m.alarm().is_emitting());

        tokio::time::sleep(Duration::from_millis(1700)).await;
        assert!(plays(&p) >= 2);
        assert_eq!(m.alarm().stats().activations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_alarm_before_first_frame_or_while_closed() {
        let (mut m, _p) = monitor();
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        assert_eq!(m.alarm().state(), AlarmState::Silent);

        m.handle_stream_event(frame(1, jpeg(8, 8), "person", 0.9));
        // nothing counts until the image has decoded
        assert_eq!(m.alarm().state(), AlarmState::Silent);
        m.settle().await;
        assert_eq!(m.alarm().state(), AlarmState::Alarming);

        m.handle_stream_event(StreamEvent::State(ConnectionState::Closed));
        assert_eq!(m.alarm().state(), AlarmState::Silent);
        assert!(!m.alarm().is_emitting());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_frame_supersedes_pending_decode() {
        let (mut m, _p) = monitor();
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        m.handle_stream_event(frame(1, jpeg(40, 30), "helmet", 0.9));
        m.handle_stream_event(frame(2, jpeg(20, 10), "no-helmet", 0.9));
        m.settle().await;

        let r = m.last_report().unwrap();
        assert_eq!((r.width, r.height), (20, 10));
        assert_eq!(r.count(BoxCategory::Other), 1);
        assert_eq!(r.count(BoxCategory::Helmet), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_image_keeps_previous_picture() {
        let (mut m, _p) = monitor();
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        m.handle_stream_event(frame(1, jpeg(16, 16), "helmet", 0.9));
        m.settle().await;

        assert!(m.classification().condition_met);
        assert_eq!(m.alarm().state(), AlarmState::Silent);

        m.handle_stream_event(frame(2, b"not a jpeg".to_vec(), "no-helmet", 0.9));
        m.settle().await;
        let r = m.last_report().unwrap();
        assert_eq!(r.count(BoxCategory::Helmet), 1);
        assert_eq!(r.count(BoxCategory::Other), 0);
        // the broken frame's detections are dropped with it
        assert!(m.classification().condition_met);
        assert_eq!(m.classification().assessments[0].detection.label, "helmet");
        assert_eq!(m.alarm().state(), AlarmState::Silent);
        assert!(m.status_line().contains("HELMET DETECTED"));
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_first_frame_never_alarms() {
        let (mut m, p) = monitor();
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        m.handle_stream_event(frame(1, b"garbage".to_vec(), "no-helmet", 0.9));
        m.settle().await;
        assert!(!m.has_frame());
        assert!(m.last_report().is_none());
        assert_eq!(m.alarm().state(), AlarmState::Silent);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(plays(&p), 0);

        m.handle_stream_event(frame(2, jpeg(8, 8), "no-helmet", 0.9));
        m.settle().await;
        assert!(m.has_frame());
        assert_eq!(m.alarm().state(), AlarmState::Alarming);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_change_reclassifies_and_rerenders() {
        let (mut m, _p) = monitor();
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        m.handle_stream_event(frame(1, jpeg(16, 16), "helmet", 0.62));
        m.settle().await;
        assert!(m.classification().condition_met);
        assert_eq!(m.last_report().unwrap().boxes.len(), 1);

        assert_eq!(m.handle_command(UserCommand::SetThreshold(0.7)), Flow::Continue);
        assert!(!m.classification().condition_met);
        assert_eq!(m.alarm().state(), AlarmState::Alarming);
        assert_eq!(m.last_report().unwrap().boxes.len(), 0);

        m.handle_command(UserCommand::StepDown);
        m.handle_command(UserCommand::StepDown);
        assert!((m.threshold().value() - 0.6).abs() < 1e-6);
        assert!(m.classification().condition_met);
        assert_eq!(m.alarm().state(), AlarmState::Silent);

        m.handle_command(UserCommand::SetThreshold(f32::NAN));
        assert!((m.threshold().value() - 0.6).abs() < 1e-6);
        m.handle_command(UserCommand::SetThreshold(5.0));
        assert_eq!(m.threshold().value(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_silences_and_ignores_later_events() {
        let (mut m, p) = monitor();
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        m.handle_stream_event(frame(1, jpeg(8, 8), "no-helmet", 0.9));
        m.settle().await;
        assert!(m.alarm().is_emitting());
        m.shutdown();
        let before = plays(&p);
        m.handle_stream_event(frame(2, jpeg(8, 8), "no-helmet", 0.9));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(plays(&p), before);
        assert!(!m.alarm().is_emitting());
        assert_eq!(m.handle_command(UserCommand::Quit), Flow::Quit);
    }

    #[tokio::test(start_paused = true)]
    async fn status_line_reflects_indicators() {
        let (mut m, _p) = monitor();
        assert!(m.status_line().starts_with("Connecting… | waiting for video feed"));
        m.handle_stream_event(StreamEvent::State(ConnectionState::Open));
        m.handle_stream_event(frame(1, jpeg(8, 8), "no-helmet", 0.9));
        m.settle().await;
        assert!(m.status_line().starts_with("System Online | WEAR HELMET | threshold 50%"));
    }
}
