//! Reference embedding resolution.
//!
//! Turns each student's enrolled reference clips into a single normalized
//! embedding at session start. Resolution is file I/O plus model
//! inference; the engine runs it on a blocking worker.

use rollcall_audio::wav;
use rollcall_voiceprint::{l2_normalize, ReferenceSet, SpeakerModel};
use tracing::warn;

use crate::types::Student;

/// Resolves one student into a reference embedding.
///
/// Uses the `verified_samples` subset when it is non-empty, otherwise
/// falls back to `voice_samples`; the two subsets are never merged. Each
/// readable clip contributes one embedding; the component-wise mean is
/// re-normalized to unit length. A clip that cannot be read or embedded
/// is skipped with a warning. Returns `None` when no clip was usable;
/// such a student has no reference and can never be confirmed present.
pub fn resolve(student: &Student, model: &dyn SpeakerModel) -> Option<Vec<f32>> {
    let clips = if !student.verified_samples.is_empty() {
        &student.verified_samples
    } else {
        &student.voice_samples
    };

    let mut sum: Vec<f64> = Vec::new();
    let mut used = 0usize;

    for path in clips {
        let clip = match wav::read_wav(path) {
            Ok(clip) => clip,
            Err(e) => {
                warn!(
                    student = %student.student_id,
                    path = %path.display(),
                    "reference clip unreadable, skipped: {e}"
                );
                continue;
            }
        };
        let embedding = match model.embed(&clip.downmix_mono(), clip.sample_rate()) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(
                    student = %student.student_id,
                    path = %path.display(),
                    "reference embedding failed, clip skipped: {e}"
                );
                continue;
            }
        };

        if sum.is_empty() {
            sum = vec![0.0; embedding.len()];
        } else if embedding.len() != sum.len() {
            warn!(
                student = %student.student_id,
                path = %path.display(),
                "embedding dimension mismatch, clip skipped"
            );
            continue;
        }
        for (acc, v) in sum.iter_mut().zip(&embedding) {
            *acc += *v as f64;
        }
        used += 1;
    }

    if used == 0 {
        warn!(student = %student.student_id, "no usable reference clips");
        return None;
    }

    let mut mean: Vec<f32> = sum.into_iter().map(|v| (v / used as f64) as f32).collect();
    l2_normalize(&mut mean);
    Some(mean)
}

/// Resolves the whole roster, in roster order, dropping students without
/// usable references.
pub fn build_reference_set(roster: &[Student], model: &dyn SpeakerModel) -> ReferenceSet {
    let mut refs = ReferenceSet::new();
    for student in roster {
        if let Some(embedding) = resolve(student, model) {
            refs.insert(student.student_id.clone(), embedding);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use rollcall_audio::Clip;
    use rollcall_voiceprint::VoiceprintError;
    use tempfile::tempdir;

    /// Embeds a waveform as its first two samples.
    struct HeadModel;

    impl SpeakerModel for HeadModel {
        fn embed(&self, samples: &[f32], _sample_rate: u32) -> Result<Vec<f32>, VoiceprintError> {
            if samples.len() < 2 {
                return Err(VoiceprintError::AudioTooShort {
                    min: 2,
                    got: samples.len(),
                });
            }
            Ok(samples[..2].to_vec())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn write_clip(dir: &Path, name: &str, samples: Vec<f32>) -> PathBuf {
        let path = dir.join(name);
        wav::write_wav(&path, &Clip::mono(samples, 16_000)).unwrap();
        path
    }

    fn student(verified: Vec<PathBuf>, voice: Vec<PathBuf>) -> Student {
        Student {
            student_id: "s1".into(),
            name: "Alice".into(),
            class_name: "CS101".into(),
            department: None,
            verified_samples: verified,
            voice_samples: voice,
        }
    }

    #[test]
    fn prefers_verified_over_voice_samples() {
        let dir = tempdir().unwrap();
        let verified = write_clip(dir.path(), "v.wav", vec![1.0, 0.0]);
        let voice = write_clip(dir.path(), "raw.wav", vec![0.0, 1.0]);

        let embedding = resolve(&student(vec![verified], vec![voice]), &HeadModel).unwrap();
        assert!((embedding[0] - 1.0).abs() < 1e-3, "got {embedding:?}");
        assert!(embedding[1].abs() < 1e-3);
    }

    #[test]
    fn falls_back_to_voice_samples() {
        let dir = tempdir().unwrap();
        let voice = write_clip(dir.path(), "raw.wav", vec![0.0, 1.0]);

        let embedding = resolve(&student(vec![], vec![voice]), &HeadModel).unwrap();
        assert!((embedding[1] - 1.0).abs() < 1e-3, "got {embedding:?}");
    }

    #[test]
    fn never_merges_subsets_even_when_verified_fails() {
        let dir = tempdir().unwrap();
        let voice = write_clip(dir.path(), "raw.wav", vec![0.0, 1.0]);
        let missing = dir.path().join("gone.wav");

        // Verified subset was chosen and produced nothing; the raw subset
        // must not be consulted as a second chance.
        assert!(resolve(&student(vec![missing], vec![voice]), &HeadModel).is_none());
    }

    #[test]
    fn averages_clips_and_renormalizes() {
        let dir = tempdir().unwrap();
        let a = write_clip(dir.path(), "a.wav", vec![1.0, 0.0]);
        let b = write_clip(dir.path(), "b.wav", vec![0.0, 1.0]);

        let embedding = resolve(&student(vec![a, b], vec![]), &HeadModel).unwrap();
        // Mean [0.5, 0.5] renormalized to unit length.
        assert!((embedding[0] - 0.7071).abs() < 1e-3, "got {embedding:?}");
        assert!((embedding[1] - 0.7071).abs() < 1e-3);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn unreadable_clip_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let good = write_clip(dir.path(), "good.wav", vec![1.0, 0.0]);
        let missing = dir.path().join("gone.wav");

        let embedding = resolve(&student(vec![missing, good], vec![]), &HeadModel).unwrap();
        assert!((embedding[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn no_clips_at_all_resolves_to_none() {
        assert!(resolve(&student(vec![], vec![]), &HeadModel).is_none());
    }

    #[test]
    fn reference_set_keeps_roster_order_and_drops_unresolvable() {
        let dir = tempdir().unwrap();
        let a = write_clip(dir.path(), "a.wav", vec![1.0, 0.0]);
        let b = write_clip(dir.path(), "b.wav", vec![0.0, 1.0]);

        let mut s1 = student(vec![a], vec![]);
        s1.student_id = "s1".into();
        let mut s2 = student(vec![], vec![]);
        s2.student_id = "s2".into();
        let mut s3 = student(vec![b], vec![]);
        s3.student_id = "s3".into();

        let refs = build_reference_set(&[s1, s2, s3], &HeadModel);
        assert_eq!(refs.len(), 2);
        let ids: Vec<&str> = refs.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["s1", "s3"]);
        assert!(refs.get("s2").is_none());
    }
}
