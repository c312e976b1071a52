use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crossbeam_channel::{Receiver, Sender};

use crate::playback::AudioConfig;

const RESTART_DELAY: Duration = Duration::from_millis(100);

/// `data:<mime>;base64,<payload>`, the form the service expects for recorded audio.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Media type for an audio file, guessed from its extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("webm") => "audio/webm",
        Some("ogg" | "opus") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("m4a" | "mp4") => "audio/mp4",
        _ => "audio/wav",
    }
}

/// Shared by the recorder and its worker thread. A worker may only publish a
/// segment while `generation` still matches the one it was started with.
struct Slot {
    generation: u64,
    child: Option<Child>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs an external recorder while recording is on and posts each finished
/// segment as a data URL.
pub struct Recorder {
    command: Vec<String>,
    mime: String,
    slot: Arc<Mutex<Slot>>,
    segment_tx: Sender<String>,
    segment_rx: Receiver<String>,
}

impl Recorder {
    pub fn new(config: &AudioConfig) -> Self {
        let (segment_tx, segment_rx) = crossbeam_channel::unbounded();
        Recorder {
            command: config.recorder.clone(),
            mime: config.recording_mime.clone(),
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                child: None,
            })),
            segment_tx,
            segment_rx,
        }
    }

    pub fn segments(&self) -> &Receiver<String> {
        &self.segment_rx
    }

    /// Start recording segments, replacing any recording in progress.
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.stop();
        if self.command.is_empty() {
            log::info!("No recorder configured, nothing will be captured");
            return Ok(());
        }

        let generation = lock(&self.slot).generation;
        let command = self.command.clone();
        let mime = self.mime.clone();
        let slot = Arc::clone(&self.slot);
        let segment_tx = self.segment_tx.clone();
        std::thread::Builder::new()
            .name("gazetalk-recorder".into())
            .spawn(move || record_segments(&command, &mime, &slot, generation, &segment_tx))?;
        log::info!("Recording started");
        Ok(())
    }

    /// Kill the running recorder. The segment it was writing is discarded.
    pub fn stop(&mut self) {
        let mut slot = lock(&self.slot);
        slot.generation += 1;
        if let Some(mut child) = slot.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                if let Err(e) = child.kill() {
                    log::warn!("Failed to stop recorder: {e}");
                }
            }
            let _ = child.wait();
            log::info!("Recording stopped");
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record_segments(
    command: &[String],
    mime: &str,
    slot: &Mutex<Slot>,
    generation: u64,
    segments: &Sender<String>,
) {
    let Some((program, args)) = command.split_first() else {
        return;
    };
    loop {
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::warn!("Failed to start recorder '{program}': {e}");
                return;
            }
        };
        let stdout = child.stdout.take();
        {
            let mut slot = lock(slot);
            if slot.generation != generation {
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
            slot.child = Some(child);
        }

        let mut bytes = Vec::new();
        if let Some(mut out) = stdout {
            if let Err(e) = out.read_to_end(&mut bytes) {
                log::warn!("Lost recorder output: {e}");
            }
        }

        let mut slot = lock(slot);
        if slot.generation != generation {
            return;
        }
        let Some(mut child) = slot.child.take() else {
            return;
        };
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                log::warn!("Recorder exited with {status}, no more segments");
                return;
            }
            Err(e) => {
                log::warn!("Lost track of recorder: {e}");
                return;
            }
        }

        if bytes.is_empty() {
            drop(slot);
            std::thread::sleep(RESTART_DELAY);
            continue;
        }
        log::debug!("Recorded a {} byte segment", bytes.len());
        if segments.send(data_url(mime, &bytes)).is_err() {
            return;
        }
    }
}
