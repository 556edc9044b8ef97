use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{error, warn};
use rodio::{source::SineWave, source::Zero, OutputStream, Sink, Source};

use crate::settings::{AlertOutput, AlertSettings};

const BEEP_LENGTH: Duration = Duration::from_millis(100);
const BEEP_VOLUME: f32 = 0.4;
const SILENCE_CHANNELS: u16 = 1;
const SILENCE_SAMPLE_RATE: u32 = 48_000;

/// Audible alert hardware. Implementations may fail; callers log and move on.
pub trait AlertActuator: Send + Sync {
    fn beep(&self, times: u32, interval: Duration) -> Result<()>;
}

/// Writes a warn line per requested beep. Used where no speaker is present.
pub struct LogBuzzer;

impl AlertActuator for LogBuzzer {
    fn beep(&self, times: u32, interval: Duration) -> Result<()> {
        warn!(
            "Posture alert: beep x{times} ({}ms apart)",
            interval.as_millis()
        );
        Ok(())
    }
}

enum BuzzerCommand {
    Beep { times: u32, interval: Duration },
}

/// Plays a short tone through the default output device.
///
/// rodio's output objects are not `Send`, so they live on a dedicated thread
/// and `beep` only enqueues a command; the frame loop never waits for audio.
pub struct SpeakerBuzzer {
    tone_hz: f32,
    tx: Arc<Mutex<Option<Sender<BuzzerCommand>>>>,
}

impl SpeakerBuzzer {
    pub fn new(tone_hz: f32) -> Self {
        Self {
            tone_hz,
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<BuzzerCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|e| anyhow!("buzzer sender lock poisoned: {e}"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<BuzzerCommand>();
        let tone_hz = self.tone_hz;

        thread::Builder::new()
            .name("alert-buzzer".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        BuzzerCommand::Beep { times, interval } => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                error!("Buzzer unavailable: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                for _ in 0..times {
                                    s.append(
                                        SineWave::new(tone_hz)
                                            .take_duration(BEEP_LENGTH)
                                            .amplify(BEEP_VOLUME),
                                    );
                                    s.append(
                                        Zero::<f32>::new(SILENCE_CHANNELS, SILENCE_SAMPLE_RATE)
                                            .take_duration(interval),
                                    );
                                }
                                s.sleep_until_end();
                            }
                        }
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn buzzer thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl AlertActuator for SpeakerBuzzer {
    fn beep(&self, times: u32, interval: Duration) -> Result<()> {
        let tx = self.ensure_thread()?;
        tx.send(BuzzerCommand::Beep { times, interval })
            .map_err(|e| anyhow!("buzzer thread is gone: {e}"))
    }
}

/// `None` when alerts are disabled.
pub fn build_actuator(settings: &AlertSettings) -> Option<Arc<dyn AlertActuator>> {
    if !settings.enabled {
        return None;
    }
    let actuator: Arc<dyn AlertActuator> = match settings.output {
        AlertOutput::Speaker => Arc::new(SpeakerBuzzer::new(settings.tone_hz)),
        AlertOutput::Log => Arc::new(LogBuzzer),
    };
    Some(actuator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_alerts_build_no_actuator() {
        let settings = AlertSettings {
            enabled: false,
            ..AlertSettings::default()
        };
        assert!(build_actuator(&settings).is_none());
    }

    #[test]
    fn log_buzzer_never_fails() {
        let actuator = build_actuator(&AlertSettings::default()).unwrap();
        assert!(actuator.beep(3, Duration::from_millis(200)).is_ok());
    }
}
