pub mod alarm;

use alarm::AlarmChime;

use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

enum AudioCommand {
    PlayAlarm,
    SetVolume(f32),
}

/// Handle to the alarm playback thread.
///
/// rodio's output objects are not Send, so they live on a dedicated thread
/// that receives commands over a channel. The thread is spawned lazily on
/// first use; playback failures (no output device) stay inside it and are
/// never surfaced to the timer.
pub struct AlarmHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
}

impl AlarmHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("alarm-audio".to_string())
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
                        AudioCommand::PlayAlarm => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                log::warn!("alarm unavailable: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                s.append(AlarmChime::new());
                                s.play();
                            }
                        }
                        AudioCommand::SetVolume(v) => {
                            if let Some(ref s) = sink {
                                s.set_volume(v.clamp(0.0, 1.0));
                            }
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
        Ok(tx_clone)
    }

    /// Queue the completion chime; best-effort.
    pub fn play_alarm(&self) {
        match self.ensure_thread() {
            Ok(tx) => {
                let _ = tx.send(AudioCommand::PlayAlarm);
            }
            Err(err) => log::warn!("failed to start audio thread: {err}"),
        }
    }

    pub fn set_volume(&self, volume: f32) {
        if let Ok(tx) = self.ensure_thread() {
            let _ = tx.send(AudioCommand::SetVolume(volume));
        }
    }
}

impl Clone for AlarmHandle {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl Default for AlarmHandle {
    fn default() -> Self {
        Self::new()
    }
}
