//! Store collection names and document keys.

/// Enrolled student profiles.
pub const STUDENTS: &str = "students";

/// Finalized, permanent attendance records.
pub const ATTENDANCE: &str = "attendance";

/// Transient per-student live status for active sessions. Rotated on
/// finalize: cleared, then re-seeded with the finalized snapshot.
pub const ATTENDANCE_LIVE: &str = "attendance_live";

/// Per-class summary documents (latest status plus dated history).
pub const CLASSES: &str = "classes";

/// Key for a student's live status document.
/// Format: `{class_name}/{student_id}`.
pub fn live_key(class_name: &str, student_id: &str) -> String {
    format!("{class_name}/{student_id}")
}
