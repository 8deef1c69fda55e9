use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An enrolled student profile, read-only from the session's perspective.
///
/// `verified_samples` are reference clips confirmed through the feedback
/// flow; `voice_samples` are everything the student ever submitted.
/// Reference resolution prefers the verified subset and falls back to the
/// raw one; the two are never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub verified_samples: Vec<PathBuf>,
    #[serde(default)]
    pub voice_samples: Vec<PathBuf>,
}

/// Presence decision for one student's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    /// Voice verified against the student's reference embedding.
    Present,
    /// Verification rejected, or the turn failed outright.
    Absent,
    /// A clip was captured but carried no speech-level energy.
    #[serde(rename = "No Speech")]
    NoSpeech,
    /// Placeholder published before this student's capture begins.
    #[serde(rename = "Not Marked")]
    NotMarked,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "Present"),
            Self::Absent => write!(f, "Absent"),
            Self::NoSpeech => write!(f, "No Speech"),
            Self::NotMarked => write!(f, "Not Marked"),
        }
    }
}

/// One student's outcome for one session turn. The unit written to both
/// the transient and the permanent store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub class_name: String,
    pub student_id: String,
    pub name: String,
    /// Best-match similarity as a percentage in `[0, 100]`, two decimals.
    pub confidence: f32,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    /// Set only on finalized snapshots re-seeded into the transient
    /// store, so pollers can drop stale state after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    /// Builds a record for the given student with the current time.
    pub fn now(
        student: &Student,
        status: AttendanceStatus,
        confidence: f32,
        audio_path: Option<PathBuf>,
    ) -> Self {
        Self {
            class_name: student.class_name.clone(),
            student_id: student.student_id.clone(),
            name: student.name.clone(),
            confidence,
            status,
            timestamp: Utc::now(),
            audio_path,
            expires_at: None,
        }
    }
}

/// Control-plane view of a session's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    /// The roster walk has not yet stopped.
    pub running: bool,
    /// The pause flag is set (walk holds before the next student).
    pub paused: bool,
    /// The walk has stopped; results await `finish`.
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_wire_labels() {
        assert_eq!(serde_json::to_value(AttendanceStatus::NoSpeech).unwrap(), json!("No Speech"));
        assert_eq!(serde_json::to_value(AttendanceStatus::NotMarked).unwrap(), json!("Not Marked"));
        assert_eq!(serde_json::to_value(AttendanceStatus::Present).unwrap(), json!("Present"));
        assert_eq!(AttendanceStatus::NoSpeech.to_string(), "No Speech");
    }

    #[test]
    fn student_defaults_tolerate_sparse_documents() {
        let student: Student = serde_json::from_value(json!({
            "student_id": "s1",
            "name": "Alice",
            "class_name": "CS101",
        }))
        .unwrap();
        assert!(student.verified_samples.is_empty());
        assert!(student.voice_samples.is_empty());
        assert!(student.department.is_none());
    }

    #[test]
    fn record_roundtrips_through_json() {
        let student: Student = serde_json::from_value(json!({
            "student_id": "s1", "name": "Alice", "class_name": "CS101",
        }))
        .unwrap();
        let record = AttendanceRecord::now(&student, AttendanceStatus::Present, 95.0, None);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], json!("Present"));
        assert!(value.get("audio_path").is_none(), "None fields stay off the wire");

        let back: AttendanceRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.student_id, "s1");
        assert_eq!(back.status, AttendanceStatus::Present);
        assert_eq!(back.confidence, 95.0);
    }
}
