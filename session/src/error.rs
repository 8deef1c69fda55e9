use thiserror::Error;

use rollcall_store::StoreError;
use rollcall_voiceprint::VoiceprintError;

/// Errors returned by session control-plane operations.
///
/// Per-student failures during the roster walk are not errors: they are
/// logged, folded into that student's attendance record and the walk
/// continues. Only model loading and roster acquisition can fail a
/// `start`, and only storage can fail a `finish`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session: model error: {0}")]
    Model(#[from] VoiceprintError),

    #[error("session: storage error: {0}")]
    Store(#[from] StoreError),
}
