/// Audio cues for shots, scores and connectivity
///
/// WAV files are read into memory once at startup. The output stream is
/// opened on the audio thread itself; without a sound device the worker logs
/// a warning and exits, the rest of the system is unaffected.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::error::AudioError;
use crate::messaging::{Event, EventBus};
use crate::state::SharedState;
use crate::utils::spawn_named;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    Shot,
    /// 5 through 10
    Score(u8),
    OutOfTarget,
    Connected,
}

impl Cue {
    pub const ALL: [Cue; 9] = [
        Cue::Score(10),
        Cue::Score(9),
        Cue::Score(8),
        Cue::Score(7),
        Cue::Score(6),
        Cue::Score(5),
        Cue::OutOfTarget,
        Cue::Connected,
        Cue::Shot,
    ];

    pub fn file_name(self) -> String {
        match self {
            Cue::Shot => "shot.wav".to_string(),
            Cue::Score(points) => format!("{points}.wav"),
            Cue::OutOfTarget => "outTarget.wav".to_string(),
            Cue::Connected => "connected.wav".to_string(),
        }
    }
}

/// Sound to play for an event, if any.
pub fn cue_for(event: &Event) -> Option<Cue> {
    match event {
        Event::Started => Some(Cue::Connected),
        Event::TriggerFired { .. } => Some(Cue::Shot),
        Event::ShotScored { score, .. } if (5..=10).contains(score) => Some(Cue::Score(*score)),
        Event::ShotScored { .. } | Event::ShotMissed | Event::ShotUnresolved => {
            Some(Cue::OutOfTarget)
        }
        Event::ConnectivityChanged { connected: true } => Some(Cue::Connected),
        _ => None,
    }
}

/// Preloaded WAV bytes keyed by cue
#[derive(Debug, Clone, Default)]
pub struct SoundLibrary {
    sounds: HashMap<Cue, Arc<Vec<u8>>>,
}

impl SoundLibrary {
    /// Read every known cue from `dir`; missing or unreadable files are skipped.
    pub fn load(dir: &Path) -> Self {
        let mut sounds = HashMap::new();
        for cue in Cue::ALL {
            let path = dir.join(cue.file_name());
            match std::fs::read(&path) {
                Ok(bytes) => {
                    sounds.insert(cue, Arc::new(bytes));
                }
                Err(e) => tracing::warn!("Sound not loaded {}: {}", path.display(), e),
            }
        }
        tracing::info!("✓ Preloaded {}/{} sounds from {}", sounds.len(), Cue::ALL.len(), dir.display());
        Self { sounds }
    }

    pub fn get(&self, cue: Cue) -> Option<Arc<Vec<u8>>> {
        self.sounds.get(&cue).cloned()
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }
}

/// Open output stream plus the preloaded sounds. Not `Send`; lives on the
/// audio thread.
pub struct SoundBoard {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    library: SoundLibrary,
}

impl SoundBoard {
    pub fn open(library: SoundLibrary) -> Result<Self, AudioError> {
        let (stream, handle) = OutputStream::try_default()?;
        Ok(Self {
            _stream: stream,
            handle,
            library,
        })
    }

    /// Start playback and return immediately. Cues overlap rather than cut
    /// each other off.
    pub fn play(&self, cue: Cue) -> Result<(), AudioError> {
        let Some(bytes) = self.library.get(cue) else {
            tracing::debug!("No sound for {:?}", cue);
            return Ok(());
        };
        // Decoder needs owned 'static data
        let decoder = Decoder::new(Cursor::new((*bytes).clone()))?;
        let sink = Sink::try_new(&self.handle)?;
        sink.append(decoder);
        sink.detach();
        Ok(())
    }
}

pub fn start_audio_worker(
    library: SoundLibrary,
    event_bus: EventBus,
    state: Arc<SharedState>,
    poll_interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    let (events, subscription) = event_bus.subscribe();
    spawn_named("audio", move || {
        let board = match SoundBoard::open(library) {
            Ok(board) => board,
            Err(e) => {
                tracing::warn!("Audio disabled: {e}");
                event_bus.unsubscribe(subscription);
                return;
            }
        };
        tracing::info!("✓ Audio worker started");

        while state.is_running() {
            match events.recv_timeout(poll_interval) {
                Ok(event) => {
                    if let Some(cue) = cue_for(&event) {
                        if let Err(e) = board.play(cue) {
                            tracing::warn!("Failed to play {:?}: {}", cue, e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        event_bus.unsubscribe(subscription);
        tracing::info!("Audio worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerKind;
    use tempfile::TempDir;

    #[test]
    fn test_score_cues() {
        let scored = |score| Event::ShotScored {
            target: "t".into(),
            score,
            registered: true,
        };
        assert_eq!(cue_for(&scored(10)), Some(Cue::Score(10)));
        assert_eq!(cue_for(&scored(5)), Some(Cue::Score(5)));
        assert_eq!(cue_for(&scored(0)), Some(Cue::OutOfTarget));
        assert_eq!(cue_for(&Event::ShotMissed), Some(Cue::OutOfTarget));
        assert_eq!(cue_for(&Event::ShotUnresolved), Some(Cue::OutOfTarget));
    }

    #[test]
    fn test_system_cues() {
        assert_eq!(
            cue_for(&Event::TriggerFired {
                source: TriggerKind::Remote
            }),
            Some(Cue::Shot)
        );
        assert_eq!(cue_for(&Event::Started), Some(Cue::Connected));
        assert_eq!(
            cue_for(&Event::ConnectivityChanged { connected: true }),
            Some(Cue::Connected)
        );
        assert_eq!(cue_for(&Event::ConnectivityChanged { connected: false }), None);
        assert_eq!(cue_for(&Event::Shutdown), None);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(Cue::Score(7).file_name(), "7.wav");
        assert_eq!(Cue::OutOfTarget.file_name(), "outTarget.wav");
    }

    #[test]
    fn test_library_skips_missing_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("10.wav"), b"RIFF").unwrap();
        std::fs::write(tmp.path().join("shot.wav"), b"RIFF").unwrap();

        let library = SoundLibrary::load(tmp.path());

        assert_eq!(library.len(), 2);
        assert!(library.get(Cue::Score(10)).is_some());
        assert!(library.get(Cue::Score(9)).is_none());
    }
}
