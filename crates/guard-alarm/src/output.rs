use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use tracing::{debug, error, info};

use crate::tone::ToneShape;
use crate::AudioError;

/// Sink for alarm pulses. Owned exclusively by the alarm controller.
pub trait ToneOutput: Send {
    /// Starts one pulse, replacing any pulse still sounding.
    fn play(&mut self, shape: &ToneShape) -> Result<(), AudioError>;
    /// Cuts the current pulse immediately.
    fn silence(&mut self);
}

#[derive(Debug, Default)]
struct Voice {
    shape: Option<ToneShape>,
    sample_idx: u64,
}

/// Default output device through cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for the lifetime of this
/// value; pulses are handed over through a shared voice slot read by the audio callback.
pub struct CpalOutput {
    voice: Arc<Mutex<Voice>>,
    shutdown: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalOutput {
    pub fn open() -> Result<Self, AudioError> {
        let voice = Arc::new(Mutex::new(Voice::default()));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, AudioError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let voice2 = voice.clone();
        let worker = std::thread::Builder::new()
            .name("alarm-audio".into())
            .spawn(move || {
                let stream = match build_stream(voice2) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until the owner drops or signals; then the stream is released here.
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("alarm: audio stream released");
            })
            .map_err(|e| AudioError::Backend(format!("spawn audio thread: {}", e)))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(name)) => {
                info!("alarm: audio output ready on {}", name);
                Ok(Self { voice, shutdown: Some(shutdown_tx), worker: Some(worker) })
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(AudioError::Backend("audio output did not start in time".into())),
        }
    }
}

impl ToneOutput for CpalOutput {
    fn play(&mut self, shape: &ToneShape) -> Result<(), AudioError> {
        let mut v = self.voice.lock().map_err(|_| AudioError::Backend("voice lock poisoned".into()))?;
        v.shape = Some(*shape);
        v.sample_idx = 0;
        Ok(())
    }

    fn silence(&mut self) {
        if let Ok(mut v) = self.voice.lock() {
            v.shape = None;
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.silence();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }
}

fn build_stream(voice: Arc<Mutex<Voice>>) -> Result<(cpal::Stream, String), AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let name = device.name().unwrap_or_else(|_| "unknown device".into());
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Backend(format!("query output config: {}", e)))?;
    let format = supported.sample_format();
    let config: StreamConfig = supported.config();

    let stream = match format {
        SampleFormat::F32 => build::<f32>(&device, &config, voice),
        SampleFormat::I16 => build::<i16>(&device, &config, voice),
        SampleFormat::U16 => build::<u16>(&device, &config, voice),
        other => return Err(AudioError::Backend(format!("unsupported sample format {:?}", other))),
    }?;
    stream.play().map_err(|e| AudioError::Backend(format!("start output stream: {}", e)))?;
    Ok((stream, name))
}

fn build<T>(device: &cpal::Device, config: &StreamConfig, voice: Arc<Mutex<Voice>>) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let rate = config.sample_rate.0 as f64;
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut guard = voice.lock().ok();
                for frame in data.chunks_mut(channels) {
                    let value = match guard.as_deref_mut() {
                        Some(Voice { shape: Some(shape), sample_idx }) => {
                            let t = Duration::from_secs_f64(*sample_idx as f64 / rate);
                            *sample_idx += 1;
                            shape.sample(t)
                        }
                        _ => 0.0,
                    };
                    let s = T::from_sample(value);
                    for out in frame.iter_mut() {
                        *out = s;
                    }
                }
            },
            |err| error!("alarm: audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Backend(format!("build output stream: {}", e)))
}
