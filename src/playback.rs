use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;

const WATCH_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Player command; the audio URL is appended as the last argument.
    /// Empty means no audio output.
    pub player: Vec<String>,
    /// Recorder command. Each run writes one segment to stdout and exits;
    /// it is restarted for as long as recording is on. Empty means no input.
    pub recorder: Vec<String>,
    /// Media type of what the recorder writes.
    pub recording_mime: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            player: Vec::new(),
            recorder: Vec::new(),
            recording_mime: "audio/wav".to_string(),
        }
    }
}

/// Posted when a playback runs to completion. Stopped playbacks post nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackDone {
    pub url: String,
}

/// Plays one audio URL at a time through an external command.
pub struct Player {
    command: Vec<String>,
    child: Option<Arc<Mutex<Child>>>,
    generation: Arc<AtomicU64>,
    done_tx: Sender<PlaybackDone>,
    done_rx: Receiver<PlaybackDone>,
}

impl Player {
    pub fn new(config: &AudioConfig) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        Player {
            command: config.player.clone(),
            child: None,
            generation: Arc::new(AtomicU64::new(0)),
            done_tx,
            done_rx,
        }
    }

    pub fn completions(&self) -> &Receiver<PlaybackDone> {
        &self.done_rx
    }

    /// Start playing `url`, stopping whatever was playing before.
    pub fn play(&mut self, url: &str) -> anyhow::Result<()> {
        self.stop();
        let generation = self.generation.load(Ordering::SeqCst);

        let Some((program, args)) = self.command.split_first() else {
            log::info!("No audio player configured, skipping {url}");
            let _ = self.done_tx.send(PlaybackDone {
                url: url.to_string(),
            });
            return Ok(());
        };

        let child = Command::new(program)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                anyhow::anyhow!("Failed to start audio player '{program}': {e}")
            })?;
        log::info!("Playing {url} (pid {})", child.id());

        let child = Arc::new(Mutex::new(child));
        self.child = Some(Arc::clone(&child));

        let current = Arc::clone(&self.generation);
        let done_tx = self.done_tx.clone();
        let url = url.to_string();
        std::thread::Builder::new()
            .name("gazetalk-playback".into())
            .spawn(move || {
                loop {
                    let status = child
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .try_wait();
                    match status {
                        Ok(Some(status)) => {
                            log::debug!("Audio player exited: {status}");
                            break;
                        }
                        Ok(None) => std::thread::sleep(WATCH_INTERVAL),
                        Err(e) => {
                            log::warn!("Lost track of audio player: {e}");
                            break;
                        }
                    }
                }
                if current.load(Ordering::SeqCst) == generation {
                    let _ = done_tx.send(PlaybackDone { url });
                }
            })?;
        Ok(())
    }

    /// Kill the current playback, if any. No completion is posted for it.
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(child) = self.child.take() {
            let mut child = child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if matches!(child.try_wait(), Ok(None)) {
                if let Err(e) = child.kill() {
                    log::warn!("Failed to stop audio player: {e}");
                }
                let _ = child.wait();
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Player that sleeps for as many seconds as the "URL" says.
    #[cfg(unix)]
    fn sleeper() -> Vec<String> {
        ["sh", "-c", "sleep \"$1\"", "player"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn without_command_completes_immediately() {
        let mut player = Player::new(&AudioConfig::default());
        player.play("http://localhost/a.wav").unwrap();
        assert_eq!(
            player.completions().recv_timeout(TIMEOUT).unwrap(),
            PlaybackDone {
                url: "http://localhost/a.wav".into()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn new_playback_replaces_old() {
        let mut player = Player::new(&AudioConfig {
            player: sleeper(),
            ..AudioConfig::default()
        });
        player.play("30").unwrap();
        player.play("0").unwrap();

        assert_eq!(player.completions().recv_timeout(TIMEOUT).unwrap().url, "0");
        assert!(
            player
                .completions()
                .recv_timeout(Duration::from_millis(200))
                .is_err()
        );
    }

    #[cfg(unix)]
    #[test]
    fn stopped_playback_posts_nothing() {
        let mut player = Player::new(&AudioConfig {
            player: sleeper(),
            ..AudioConfig::default()
        });
        player.play("30").unwrap();
        player.stop();
        assert!(
            player
                .completions()
                .recv_timeout(Duration::from_millis(200))
                .is_err()
        );
    }

    #[test]
    fn missing_program_is_an_error() {
        let mut player = Player::new(&AudioConfig {
            player: vec!["gazetalk-no-such-player".into()],
            ..AudioConfig::default()
        });
        assert!(player.play("x").is_err());
    }
}
