//! Speaker verification primitives for roll-call attendance.
//!
//! # Architecture
//!
//! The pipeline confirms or rejects a claimed identity in three stages:
//!
//! 1. [`fbank::compute_fbank`]: mono f32 waveform -> log mel filterbank
//! 2. [`SpeakerModel::embed`]: waveform -> dense embedding vector
//! 3. [`decide`]: probe embedding + claimed id + reference set -> accept/reject
//!
//! This is closed-set one-vs-rest verification: the claimed identity is
//! supplied externally (the current roster position), and the full
//! candidate pool is used only to compute the margin between the best and
//! second-best match. A probe that merely resembles *someone* strongly,
//! but not uniquely the claimed speaker, is rejected.
//!
//! [`MelStatsModel`] is a self-contained embedding model (filterbank
//! statistics pooling) that needs no trained artifact; production
//! deployments substitute a real model behind [`SpeakerModel`].

mod decision;
mod error;
pub mod fbank;
mod melstats;
mod model;
mod similarity;

pub use decision::{decide, Decision, DecisionPolicy};
pub use error::VoiceprintError;
pub use fbank::{compute_fbank, l2_normalize, FbankConfig};
pub use melstats::{MelStatsModel, MelStatsProvider};
pub use model::{ModelProvider, SpeakerModel};
pub use similarity::{cosine_similarity, ReferenceSet};
