use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use rollcall_audio::{vad, wav, AudioSource, Clip};
use rollcall_store::{DocStore, Filter, StoreError};
use rollcall_voiceprint::{decide, ModelProvider, ReferenceSet, SpeakerModel};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::keys;
use crate::resolver;
use crate::roster;
use crate::types::{AttendanceRecord, AttendanceStatus, SessionStatus, Student};

/// Outcome of a `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session was registered and its roster walk is running.
    Started,
    /// A non-stopped session already exists for the class; nothing done.
    AlreadyRunning,
    /// No students are enrolled; the session was registered already
    /// stopped with empty results.
    EmptyRoster,
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "attendance session started"),
            Self::AlreadyRunning => write!(f, "session already running"),
            Self::EmptyRoster => write!(f, "no students enrolled for this class"),
        }
    }
}

/// Outcome of a `pause` or `resume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    NoSession,
    NotPaused,
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "ok"),
            Self::NoSession => write!(f, "no active session"),
            Self::NotPaused => write!(f, "session is not paused"),
        }
    }
}

/// Shared between the control plane and one roster walk. These flags are
/// the sole synchronization point: control calls write, the walk polls.
#[derive(Debug, Default)]
struct SessionFlags {
    paused: AtomicBool,
    stop: AtomicBool,
}

impl SessionFlags {
    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_paused(&self, value: bool) {
        self.paused.store(value, Ordering::SeqCst);
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

struct SessionHandle {
    flags: Arc<SessionFlags>,
    results: Arc<Mutex<Vec<AttendanceRecord>>>,
}

/// Registry and control plane for attendance sessions.
///
/// At most one active session exists per class; sessions for different
/// classes run independently. All control calls return promptly: the
/// roster walk itself runs on a spawned task and blocking work (capture,
/// inference, reference resolution) is pushed to blocking workers.
pub struct AttendanceEngine {
    store: Arc<dyn DocStore>,
    models: Arc<dyn ModelProvider>,
    audio: Arc<dyn AudioSource>,
    config: SessionConfig,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn DocStore>,
        models: Arc<dyn ModelProvider>,
        audio: Arc<dyn AudioSource>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            models,
            audio,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a session for a class. Must be called within a tokio
    /// runtime: the roster walk is spawned as a background task and this
    /// call returns as soon as it is registered.
    ///
    /// Model-load and roster-acquisition failures are fatal and leave no
    /// registry entry. An empty roster registers an already-stopped
    /// session (reported, not fatal).
    pub fn start(&self, class_name: &str) -> Result<StartOutcome, SessionError> {
        if self.is_active(class_name) {
            warn!(class = class_name, "start ignored, session already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let model = self.models.load()?;
        let roster = roster::load_roster(self.store.as_ref(), class_name)?;

        let flags = Arc::new(SessionFlags::default());
        let results = Arc::new(Mutex::new(Vec::new()));
        let handle = SessionHandle {
            flags: Arc::clone(&flags),
            results: Arc::clone(&results),
        };

        if roster.is_empty() {
            warn!(class = class_name, "no students found, session ends immediately");
            flags.request_stop();
            if !self.try_register(class_name, handle) {
                return Ok(StartOutcome::AlreadyRunning);
            }
            return Ok(StartOutcome::EmptyRoster);
        }

        // Registration re-checks under the lock: a racing start between
        // the activity check above and here must not spawn a second walk.
        if !self.try_register(class_name, handle) {
            warn!(class = class_name, "start ignored, session already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let walker = Walker {
            store: Arc::clone(&self.store),
            model,
            audio: Arc::clone(&self.audio),
            config: self.config.clone(),
            class_name: class_name.to_string(),
            roster,
            flags,
            results,
        };
        tokio::spawn(walker.run());

        info!(class = class_name, "attendance session registered");
        Ok(StartOutcome::Started)
    }

    /// Sets the pause flag. Idempotent; the walk holds before its next
    /// student once it observes the flag.
    pub fn pause(&self, class_name: &str) -> ControlOutcome {
        match self.sessions.lock().get(class_name) {
            None => ControlOutcome::NoSession,
            Some(handle) => {
                handle.flags.set_paused(true);
                info!(class = class_name, "session paused");
                ControlOutcome::Applied
            }
        }
    }

    /// Clears the pause flag. Reports `NotPaused` (without effect) when
    /// the session is not currently paused.
    pub fn resume(&self, class_name: &str) -> ControlOutcome {
        match self.sessions.lock().get(class_name) {
            None => ControlOutcome::NoSession,
            Some(handle) if !handle.flags.paused() => ControlOutcome::NotPaused,
            Some(handle) => {
                handle.flags.set_paused(false);
                info!(class = class_name, "session resumed");
                ControlOutcome::Applied
            }
        }
    }

    /// Lifecycle view of the class's session, if one is registered.
    pub fn status(&self, class_name: &str) -> Option<SessionStatus> {
        self.sessions.lock().get(class_name).map(|handle| {
            let stopped = handle.flags.stopped();
            SessionStatus {
                running: !stopped,
                paused: handle.flags.paused(),
                completed: stopped,
            }
        })
    }

    /// Reads the transient per-student status for a class straight from
    /// the store; does not touch session internals.
    pub fn read_live(&self, class_name: &str) -> Result<Vec<AttendanceRecord>, SessionError> {
        let docs = self
            .store
            .find(keys::ATTENDANCE_LIVE, &Filter::new().eq("class_name", class_name))?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<AttendanceRecord>(doc.value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %doc.key, "skipping malformed live record: {e}"),
            }
        }
        Ok(records)
    }

    /// Stops the session, finalizes its results into permanent storage
    /// and removes it from the registry.
    ///
    /// Results fall back to the transient store when the in-memory list
    /// is empty. Each record is written with a recency-bounded upsert: a
    /// permanent record for the same student from the last 24 hours is
    /// replaced instead of duplicated. The transient store is cleared and
    /// re-seeded with the finalized snapshot carrying a next-midnight
    /// expiry marker. Calling `finish` with no registered session returns
    /// an empty list and writes nothing.
    pub fn finish(&self, class_name: &str) -> Result<Vec<AttendanceRecord>, SessionError> {
        let Some(handle) = self.sessions.lock().remove(class_name) else {
            debug!(class = class_name, "finish called with no registered session");
            return Ok(Vec::new());
        };
        handle.flags.request_stop();

        let mut results = handle.results.lock().clone();
        if results.is_empty() {
            // The walk may have produced nothing in memory (stopped before
            // its first turn, or the session object was lost); transient
            // records are the next best source of truth.
            results = self.read_live(class_name)?;
        }

        let now = Utc::now();
        for record in &results {
            self.commit_record(record, now)?;
        }
        if !results.is_empty() {
            self.write_class_summary(class_name, &results, now)?;
        }

        // Rotate the transient store: drop live rows, re-seed with the
        // finalized snapshot so pollers keep last known state until the
        // next day.
        self.store
            .delete(keys::ATTENDANCE_LIVE, &Filter::new().eq("class_name", class_name))?;
        let expires_at = next_midnight(now);
        for record in &results {
            let mut snapshot = record.clone();
            snapshot.expires_at = Some(expires_at);
            let value = encode(&snapshot)?;
            let key = keys::live_key(class_name, &snapshot.student_id);
            self.store.upsert(keys::ATTENDANCE_LIVE, &key, value)?;
        }

        info!(class = class_name, records = results.len(), "attendance finalized");
        Ok(results)
    }

    fn is_active(&self, class_name: &str) -> bool {
        self.sessions
            .lock()
            .get(class_name)
            .is_some_and(|handle| !handle.flags.stopped())
    }

    /// Inserts the handle unless a non-stopped session already holds the
    /// class. Returns false when the registration lost that race.
    fn try_register(&self, class_name: &str, handle: SessionHandle) -> bool {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(class_name) {
            if !existing.flags.stopped() {
                return false;
            }
        }
        sessions.insert(class_name.to_string(), handle);
        true
    }

    /// Permanent write for one record: replace the student's record from
    /// the last 24 hours if one exists, insert otherwise.
    fn commit_record(
        &self,
        record: &AttendanceRecord,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let filter = Filter::new()
            .eq("class_name", record.class_name.as_str())
            .eq("student_id", record.student_id.as_str());
        let cutoff = now - chrono::Duration::hours(24);

        let recent_key = self
            .store
            .find(keys::ATTENDANCE, &filter)?
            .into_iter()
            .find(|doc| doc_timestamp(&doc.value).is_some_and(|t| t >= cutoff))
            .map(|doc| doc.key);

        let value = encode(record)?;
        match recent_key {
            Some(key) => self.store.upsert(keys::ATTENDANCE, &key, value)?,
            None => {
                self.store.insert(keys::ATTENDANCE, value)?;
            }
        }
        Ok(())
    }

    fn write_class_summary(
        &self,
        class_name: &str,
        results: &[AttendanceRecord],
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let present = results
            .iter()
            .filter(|r| r.status == AttendanceStatus::Present)
            .count();
        let mean_confidence =
            results.iter().map(|r| r.confidence as f64).sum::<f64>() / results.len() as f64;
        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M:%S").to_string();

        let filter = Filter::new().eq("class_name", class_name);
        let key = match self.store.find(keys::CLASSES, &filter)?.into_iter().next() {
            Some(mut doc) => {
                if let Some(obj) = doc.value.as_object_mut() {
                    obj.insert("status".into(), json!("Recorded"));
                    obj.insert("confidence".into(), json!(mean_confidence));
                    obj.insert("date".into(), json!(date));
                    obj.insert("time".into(), json!(time));
                }
                self.store.upsert(keys::CLASSES, &doc.key, doc.value)?;
                doc.key
            }
            None => self.store.insert(
                keys::CLASSES,
                json!({
                    "class_name": class_name,
                    "status": "Recorded",
                    "confidence": mean_confidence,
                    "date": date,
                    "time": time,
                }),
            )?,
        };

        let summary = json!({
            "date": date,
            "time": time,
            "present": present,
            "total": results.len(),
            "avg_confidence": mean_confidence,
        });
        self.store
            .push(keys::CLASSES, &key, "attendance_dates", summary)?;
        Ok(())
    }
}

/// One session's roster walk. Owns clones of every collaborator so the
/// spawned task is self-contained; communicates with the control plane
/// only through the shared flags and results list.
struct Walker {
    store: Arc<dyn DocStore>,
    model: Arc<dyn SpeakerModel>,
    audio: Arc<dyn AudioSource>,
    config: SessionConfig,
    class_name: String,
    roster: Vec<Student>,
    flags: Arc<SessionFlags>,
    results: Arc<Mutex<Vec<AttendanceRecord>>>,
}

impl Walker {
    async fn run(self) {
        let refs = self.build_references().await;
        info!(
            class = %self.class_name,
            students = self.roster.len(),
            references = refs.len(),
            "attendance session running"
        );

        'walk: for student in &self.roster {
            if self.flags.stopped() {
                info!(class = %self.class_name, "session stopped before roster end");
                break;
            }

            // Cooperative pause: hold here, but keep observing stop so a
            // finish during a pause still exits promptly.
            while self.flags.paused() {
                if self.flags.stopped() {
                    info!(class = %self.class_name, "session stopped while paused");
                    break 'walk;
                }
                debug!(class = %self.class_name, "session paused, waiting");
                tokio::time::sleep(self.config.pause_poll).await;
            }
            if self.flags.stopped() {
                break;
            }

            // Publish a placeholder first so pollers never see this
            // student's record from a previous turn.
            self.publish(&AttendanceRecord::now(
                student,
                AttendanceStatus::NotMarked,
                0.0,
                None,
            ));

            self.audio.announce(&student.name);
            let record = self.take_turn(student, &refs).await;
            debug!(
                student = %record.student_id,
                status = %record.status,
                confidence = record.confidence,
                "turn recorded"
            );
            self.publish(&record);
            self.results.lock().push(record);

            // Pacing: the transient store has no push channel, so give
            // pollers a window to observe this turn before the next one
            // overwrites anything.
            tokio::time::sleep(self.config.step_delay).await;
        }

        self.flags.request_stop();
        info!(class = %self.class_name, "attendance session finished");
    }

    async fn build_references(&self) -> ReferenceSet {
        let roster = self.roster.clone();
        let model = Arc::clone(&self.model);
        match tokio::task::spawn_blocking(move || resolver::build_reference_set(&roster, model.as_ref()))
            .await
        {
            Ok(refs) => refs,
            Err(e) => {
                warn!(class = %self.class_name, "reference resolution task failed: {e}");
                ReferenceSet::new()
            }
        }
    }

    /// Capture, gate, embed and decide for a single student. Failures
    /// are folded into the record; they never abort the walk.
    async fn take_turn(&self, student: &Student, refs: &ReferenceSet) -> AttendanceRecord {
        let captured = {
            let audio = Arc::clone(&self.audio);
            let duration = self.config.record_duration;
            match tokio::task::spawn_blocking(move || audio.capture(duration)).await {
                Ok(Ok(clip)) => Some(clip),
                Ok(Err(e)) => {
                    warn!(student = %student.student_id, "capture failed: {e}");
                    None
                }
                Err(e) => {
                    warn!(student = %student.student_id, "capture task failed: {e}");
                    None
                }
            }
        };
        let Some(clip) = captured else {
            return AttendanceRecord::now(student, AttendanceStatus::Absent, 0.0, None);
        };

        let audio_path = self.spool(student, &clip);

        let (speech, level) = vad::is_speech_present(&clip, self.config.rms_threshold);
        if !speech {
            debug!(student = %student.student_id, rms = level, "no speech in clip");
            return AttendanceRecord::now(student, AttendanceStatus::NoSpeech, 0.0, audio_path);
        }

        let probe = {
            let model = Arc::clone(&self.model);
            let samples = clip.downmix_mono();
            let sample_rate = clip.sample_rate();
            match tokio::task::spawn_blocking(move || model.embed(&samples, sample_rate)).await {
                Ok(Ok(embedding)) => Some(embedding),
                Ok(Err(e)) => {
                    warn!(student = %student.student_id, "probe embedding failed: {e}");
                    None
                }
                Err(e) => {
                    warn!(student = %student.student_id, "embedding task failed: {e}");
                    None
                }
            }
        };
        let Some(probe) = probe else {
            return AttendanceRecord::now(student, AttendanceStatus::Absent, 0.0, audio_path);
        };

        let decision = decide(&probe, &student.student_id, refs, &self.config.policy);
        debug!(
            student = %student.student_id,
            best = decision.best_id.as_deref().unwrap_or("-"),
            confidence = decision.confidence_pct,
            margin = decision.margin,
            "similarity decision"
        );
        let status = if decision.accepted {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Absent
        };
        AttendanceRecord::now(student, status, decision.confidence_pct, audio_path)
    }

    /// Live-status upsert. Best-effort: the transient channel failing
    /// must not fail the turn.
    fn publish(&self, record: &AttendanceRecord) {
        let key = keys::live_key(&record.class_name, &record.student_id);
        match encode(record) {
            Ok(value) => {
                if let Err(e) = self.store.upsert(keys::ATTENDANCE_LIVE, &key, value) {
                    warn!(student = %record.student_id, "live status write failed: {e}");
                }
            }
            Err(e) => warn!(student = %record.student_id, "live record encode failed: {e}"),
        }
    }

    fn spool(&self, student: &Student, clip: &Clip) -> Option<PathBuf> {
        let dir = self.config.spool_dir.as_ref()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("spool dir unavailable: {e}");
            return None;
        }
        let name = format!(
            "{}_{}.wav",
            student.student_id,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(name);
        match wav::write_wav(&path, clip) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(student = %student.student_id, "clip spool failed: {e}");
                None
            }
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, SessionError> {
    serde_json::to_value(value)
        .map_err(|e| SessionError::Store(StoreError::Serialization(e.to_string())))
}

fn doc_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .get("timestamp")?
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// The first instant of the next UTC day.
fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + chrono::Days::new(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}
