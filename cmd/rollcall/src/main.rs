//! rollcall - voice roll-call attendance over pre-recorded clips.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use rollcall_audio::FileSequenceSource;
use rollcall_session::{
    keys, AttendanceEngine, AttendanceRecord, AttendanceStatus, SessionConfig, StartOutcome,
};
use rollcall_store::{DocStore, Filter, RedbStore};
use rollcall_voiceprint::MelStatsProvider;

/// Voice roll-call attendance.
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Voice roll-call attendance over pre-recorded clips")]
struct Args {
    /// Attendance database path
    #[arg(long, default_value = "rollcall.redb")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll a student profile with reference clips
    Enroll {
        /// Unique student id
        #[arg(long)]
        id: String,

        /// Student's display name
        #[arg(long)]
        name: String,

        /// Class the student belongs to
        #[arg(long)]
        class: String,

        /// Reference WAV clip, repeatable
        #[arg(long = "clip")]
        clips: Vec<PathBuf>,
    },

    /// Run an attendance session for a class and finalize it. Clips are
    /// consumed from a directory in lexicographic order, one per roster
    /// turn.
    Run {
        #[arg(long)]
        class: String,

        /// Directory of WAV clips to stand in for live capture
        #[arg(long)]
        clips: PathBuf,

        /// Seconds to wait between students
        #[arg(long, default_value_t = 2.0)]
        step_delay: f64,

        /// Directory for spooling captured clips
        #[arg(long)]
        spool: Option<PathBuf>,
    },

    /// Print the live per-student status for a class
    Live {
        #[arg(long)]
        class: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let store: Arc<dyn DocStore> = Arc::new(RedbStore::open(&args.db)?);

    match args.command {
        Command::Enroll {
            id,
            name,
            class,
            clips,
        } => enroll(store.as_ref(), &id, &name, &class, &clips),
        Command::Run {
            class,
            clips,
            step_delay,
            spool,
        } => run(store, &class, &clips, step_delay, spool).await,
        Command::Live { class } => live(store.as_ref(), &class),
    }
}

fn enroll(store: &dyn DocStore, id: &str, name: &str, class: &str, clips: &[PathBuf]) -> Result<()> {
    let existing = store.find(keys::STUDENTS, &Filter::new().eq("student_id", id))?;
    if !existing.is_empty() {
        bail!("a profile already exists for {id}");
    }

    for clip in clips {
        if !clip.exists() {
            bail!("reference clip not found: {}", clip.display());
        }
    }

    store.insert(
        keys::STUDENTS,
        json!({
            "student_id": id,
            "name": name,
            "class_name": class,
            "verified_samples": clips,
            "voice_samples": clips,
        }),
    )?;
    println!("enrolled {name} ({id}) in {class} with {} reference clip(s)", clips.len());
    Ok(())
}

async fn run(
    store: Arc<dyn DocStore>,
    class: &str,
    clips: &PathBuf,
    step_delay: f64,
    spool: Option<PathBuf>,
) -> Result<()> {
    let source = Arc::new(FileSequenceSource::from_dir(clips)?);
    let config = SessionConfig {
        step_delay: Duration::from_secs_f64(step_delay),
        spool_dir: spool,
        ..SessionConfig::default()
    };
    let engine = AttendanceEngine::new(store, Arc::new(MelStatsProvider::new()), source, config);

    match engine.start(class)? {
        StartOutcome::Started => {}
        outcome => bail!("{outcome}"),
    }

    while !engine.status(class).map(|s| s.completed).unwrap_or(true) {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let results = engine.finish(class)?;
    print_records(&results);

    let present = results
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    println!("\n{present}/{} present", results.len());
    Ok(())
}

fn live(store: &dyn DocStore, class: &str) -> Result<()> {
    let docs = store.find(keys::ATTENDANCE_LIVE, &Filter::new().eq("class_name", class))?;
    let records: Vec<AttendanceRecord> = docs
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc.value).ok())
        .collect();

    if records.is_empty() {
        println!("no live records for {class}");
        return Ok(());
    }
    print_records(&records);
    Ok(())
}

fn print_records(records: &[AttendanceRecord]) {
    println!("{:<12} {:<20} {:<12} {:>10}", "STUDENT", "NAME", "STATUS", "CONF");
    for r in records {
        println!(
            "{:<12} {:<20} {:<12} {:>9.2}%",
            r.student_id,
            r.name,
            r.status.to_string(),
            r.confidence
        );
    }
}
