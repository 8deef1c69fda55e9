use std::sync::Arc;

use crate::fbank::{compute_fbank, l2_normalize, FbankConfig};
use crate::model::{ModelProvider, SpeakerModel};
use crate::VoiceprintError;

/// Artifact-free speaker embedding via filterbank statistics pooling.
///
/// The embedding is the per-mel-bin mean concatenated with the per-bin
/// standard deviation of the log mel filterbank, L2-normalized. Dimension
/// is `2 * num_mels`. This captures coarse spectral envelope and dynamics,
/// enough to separate voices in a small roster; deployments wanting real
/// discrimination substitute a trained model behind [`SpeakerModel`].
pub struct MelStatsModel {
    cfg: FbankConfig,
}

impl MelStatsModel {
    pub fn new() -> Self {
        Self::with_config(FbankConfig::default())
    }

    pub fn with_config(cfg: FbankConfig) -> Self {
        Self { cfg }
    }

    fn min_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.cfg.frame_ms / 1000.0) as usize
    }
}

impl Default for MelStatsModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeakerModel for MelStatsModel {
    fn embed(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, VoiceprintError> {
        let features = compute_fbank(samples, sample_rate, &self.cfg).ok_or(
            VoiceprintError::AudioTooShort {
                min: self.min_samples(sample_rate),
                got: samples.len(),
            },
        )?;

        let bins = self.cfg.num_mels;
        let frames = features.len() as f64;
        let mut embedding = vec![0.0f32; bins * 2];

        for m in 0..bins {
            let mean: f64 = features.iter().map(|f| f[m] as f64).sum::<f64>() / frames;
            let var: f64 = features
                .iter()
                .map(|f| {
                    let d = f[m] as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / frames;
            embedding[m] = mean as f32;
            embedding[bins + m] = var.sqrt() as f32;
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.cfg.num_mels * 2
    }
}

/// [`ModelProvider`] for [`MelStatsModel`]. Never fails to load.
#[derive(Default)]
pub struct MelStatsProvider {
    cfg: FbankConfig,
}

impl MelStatsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(cfg: FbankConfig) -> Self {
        Self { cfg }
    }
}

impl ModelProvider for MelStatsProvider {
    fn load(&self) -> Result<Arc<dyn SpeakerModel>, VoiceprintError> {
        Ok(Arc::new(MelStatsModel::with_config(self.cfg.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, rate: u32, secs: f64) -> Vec<f32> {
        let n = (rate as f64 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin() as f32 * 0.5)
            .collect()
    }

    #[test]
    fn embedding_has_declared_dimension_and_unit_norm() {
        let model = MelStatsModel::new();
        let emb = model.embed(&tone(440.0, 16_000, 0.5), 16_000).unwrap();

        assert_eq!(emb.len(), model.dimension());
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm {norm}");
    }

    #[test]
    fn embedding_is_deterministic() {
        let model = MelStatsModel::new();
        let wave = tone(440.0, 16_000, 0.5);
        assert_eq!(
            model.embed(&wave, 16_000).unwrap(),
            model.embed(&wave, 16_000).unwrap()
        );
    }

    #[test]
    fn distinct_signals_embed_apart() {
        let model = MelStatsModel::new();
        let a = model.embed(&tone(200.0, 16_000, 0.5), 16_000).unwrap();
        let b = model.embed(&tone(3000.0, 16_000, 0.5), 16_000).unwrap();

        let sim = crate::cosine_similarity(&a, &b);
        assert!(sim < 0.999, "tones should not embed identically: {sim}");
    }

    #[test]
    fn too_short_audio_is_an_error() {
        let model = MelStatsModel::new();
        let err = model.embed(&[0.0; 10], 16_000).unwrap_err();
        assert!(matches!(err, VoiceprintError::AudioTooShort { .. }));
    }

    #[test]
    fn provider_loads() {
        let model = MelStatsProvider::new().load().unwrap();
        assert_eq!(model.dimension(), FbankConfig::default().num_mels * 2);
    }
}
