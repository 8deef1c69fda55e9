use std::path::PathBuf;
use std::time::Duration;

use rollcall_audio::vad::DEFAULT_RMS_THRESHOLD;
use rollcall_voiceprint::DecisionPolicy;

/// Tunables for a session's roster walk.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Length of each student's capture window (default: 4s).
    pub record_duration: Duration,
    /// How often a paused walk re-checks its flags (default: 1s). Stop
    /// requests issued during a pause are observed within one poll.
    pub pause_poll: Duration,
    /// Delay after each student's turn before moving on (default: 2s).
    /// The transient store is the only live-progress channel and has no
    /// push mechanism, so the walk must not overwrite records faster
    /// than a polling reader can observe them.
    pub step_delay: Duration,
    /// RMS level below which a turn is recorded as "No Speech"
    /// (default: 0.01).
    pub rms_threshold: f32,
    /// Accept/reject thresholds for the similarity decision.
    pub policy: DecisionPolicy,
    /// Directory for spooling captured clips as WAV files. `None`
    /// disables spooling; records then carry no `audio_path`.
    pub spool_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            record_duration: Duration::from_secs(4),
            pause_poll: Duration::from_secs(1),
            step_delay: Duration::from_secs(2),
            rms_threshold: DEFAULT_RMS_THRESHOLD,
            policy: DecisionPolicy::default(),
            spool_dir: None,
        }
    }
}
