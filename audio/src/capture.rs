use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::{wav, AudioError, Clip};

/// Captures audio clips for the session engine.
///
/// `capture` blocks the caller for up to the requested duration; the
/// session engine runs it on a blocking worker so the control plane stays
/// responsive.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait AudioSource: Send + Sync {
    /// Records one clip of roughly the given duration.
    fn capture(&self, duration: Duration) -> Result<Clip, AudioError>;

    /// Announces the next student's name before capture. Best-effort:
    /// failures are swallowed by implementations. Default is a no-op.
    fn announce(&self, _name: &str) {}
}

/// An [`AudioSource`] that replays WAV files in a fixed order.
///
/// Each `capture` call consumes the next file in the sequence. Used to
/// drive sessions from pre-recorded clips (one clip per roster turn) and
/// in tests. Once the sequence is exhausted, `capture` fails with
/// [`AudioError::Exhausted`], which the session engine records as an
/// absence.
pub struct FileSequenceSource {
    files: Mutex<VecDeque<PathBuf>>,
}

impl FileSequenceSource {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files: Mutex::new(files.into()),
        }
    }

    /// Builds a source from every `.wav` file in a directory, in
    /// lexicographic order.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, AudioError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "wav"))
            .collect();
        files.sort();
        Ok(Self::new(files))
    }

    /// Remaining clips in the sequence.
    pub fn remaining(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl AudioSource for FileSequenceSource {
    fn capture(&self, _duration: Duration) -> Result<Clip, AudioError> {
        let next = self
            .files
            .lock()
            .map_err(|e| AudioError::Wav(e.to_string()))?
            .pop_front();
        match next {
            Some(path) => wav::read_wav(path),
            None => Err(AudioError::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replays_files_in_order_then_exhausts() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        wav::write_wav(&a, &Clip::mono(vec![0.1; 8], 16_000)).unwrap();
        wav::write_wav(&b, &Clip::mono(vec![0.2; 4], 16_000)).unwrap();

        let source = FileSequenceSource::from_dir(dir.path()).unwrap();
        assert_eq!(source.remaining(), 2);

        let first = source.capture(Duration::from_secs(1)).unwrap();
        assert_eq!(first.frames(), 8);
        let second = source.capture(Duration::from_secs(1)).unwrap();
        assert_eq!(second.frames(), 4);

        let err = source.capture(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, AudioError::Exhausted));
    }

    #[test]
    fn from_dir_skips_non_wav_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not audio").unwrap();
        wav::write_wav(
            dir.path().join("only.wav"),
            &Clip::mono(vec![0.0; 4], 16_000),
        )
        .unwrap();

        let source = FileSequenceSource::from_dir(dir.path()).unwrap();
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn default_announce_is_noop() {
        let source = FileSequenceSource::new(vec![]);
        source.announce("anyone");
    }
}
