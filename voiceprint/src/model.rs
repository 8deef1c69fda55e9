use std::sync::Arc;

use crate::VoiceprintError;

/// Extracts speaker embedding vectors from raw audio.
///
/// The input is a mono f32 waveform in `[-1, 1]` together with its sample
/// rate. The output is a dense f32 vector whose dimensionality is returned
/// by [`SpeakerModel::dimension`]. Embeddings of the same speaker should
/// have high cosine similarity regardless of what was said.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use; the session engine
/// shares one model instance across reference resolution and probe
/// extraction without locking.
pub trait SpeakerModel: Send + Sync {
    /// Computes a speaker embedding from a mono waveform.
    fn embed(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, VoiceprintError>;

    /// Returns the dimensionality of the embedding vectors.
    fn dimension(&self) -> usize;
}

/// Loads a [`SpeakerModel`] at session start.
///
/// The engine calls `load` once per `start` and treats a failure as fatal
/// to that session (no session is registered). Providers that read a
/// trained artifact from disk surface missing/corrupt files here.
pub trait ModelProvider: Send + Sync {
    fn load(&self) -> Result<Arc<dyn SpeakerModel>, VoiceprintError>;
}
