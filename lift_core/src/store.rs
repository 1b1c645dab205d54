//! Append-only workout log.
//!
//! Finalized sessions are appended to a JSONL (JSON Lines) file with file
//! locking. Records are never rewritten; corrections append a new record.

use crate::{Error, Result, SessionRecord};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Storage for finalized session records
pub trait WorkoutLogStore {
    /// Insert a finalized record. Fails with `DuplicateId` if the id is taken,
    /// leaving existing contents untouched.
    fn append(&mut self, record: SessionRecord) -> Result<()>;

    /// All records in insertion order
    fn all(&self) -> &[SessionRecord];

    /// Records whose start falls within `[start, end]`
    fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&SessionRecord> {
        self.all()
            .iter()
            .filter(|r| r.started_at >= start && r.started_at <= end)
            .collect()
    }

    fn get(&self, id: Uuid) -> Option<&SessionRecord> {
        self.all().iter().find(|r| r.id == id)
    }

    fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }

    /// Most recently inserted records first
    fn recent(&self, count: usize) -> Vec<&SessionRecord> {
        self.all().iter().rev().take(count).collect()
    }

    /// Records started on a calendar day in `tz`
    fn on_date<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Vec<&SessionRecord>
    where
        Self: Sized,
    {
        self.all()
            .iter()
            .filter(|r| r.started_at.with_timezone(tz).date_naive() == date)
            .collect()
    }

    fn total_sessions(&self) -> usize {
        self.all().len()
    }

    fn total_active_hours(&self) -> f64 {
        let seconds: u64 = self.all().iter().map(|r| r.active_duration_seconds).sum();
        seconds as f64 / 3600.0
    }
}

/// In-memory log, used for dry runs and tests
#[derive(Clone, Debug, Default)]
pub struct MemoryLog {
    records: Vec<SessionRecord>,
    ids: HashSet<Uuid>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from existing records, rejecting duplicate ids
    pub fn from_records(records: Vec<SessionRecord>) -> Result<Self> {
        let mut log = Self::new();
        for record in records {
            log.append(record)?;
        }
        Ok(log)
    }
}

impl WorkoutLogStore for MemoryLog {
    fn append(&mut self, record: SessionRecord) -> Result<()> {
        if !self.ids.insert(record.id) {
            return Err(Error::DuplicateId(record.id));
        }
        self.records.push(record);
        Ok(())
    }

    fn all(&self) -> &[SessionRecord] {
        &self.records
    }
}

/// A line of the log file that could not be used
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorruptLine {
    /// 1-based line number
    pub line: usize,
    pub reason: String,
}

/// What was lost while loading a log file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub corrupt_lines: Vec<CorruptLine>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt_lines.is_empty()
    }
}

/// JSONL-backed log with file locking
#[derive(Debug)]
pub struct JsonlLog {
    path: PathBuf,
    records: Vec<SessionRecord>,
    ids: HashSet<Uuid>,
    report: LoadReport,
}

impl JsonlLog {
    /// Open a log file, loading every readable record.
    ///
    /// A missing file is an empty log. Unparseable lines and duplicate ids are
    /// skipped and listed in [`JsonlLog::load_report`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut log = Self {
            path,
            records: Vec::new(),
            ids: HashSet::new(),
            report: LoadReport::default(),
        };

        if !log.path.exists() {
            tracing::debug!("No workout log at {:?}, starting empty", log.path);
            return Ok(log);
        }

        let file = File::open(&log.path)
            .map_err(|e| persistence_error("open", &log.path, e))?;
        file.lock_shared()
            .map_err(|e| persistence_error("lock", &log.path, e))?;

        let reader = BufReader::new(&file);
        for (line_num, line_result) in reader.lines().enumerate() {
            let line = match line_result {
                Ok(line) => line,
                Err(e) => {
                    let _ = file.unlock();
                    return Err(persistence_error("read", &log.path, e));
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<SessionRecord>(&line) {
                Ok(record) if log.ids.contains(&record.id) => {
                    log.report.corrupt_lines.push(CorruptLine {
                        line: line_num + 1,
                        reason: format!("duplicate session id {}", record.id),
                    });
                }
                Ok(record) => {
                    log.ids.insert(record.id);
                    log.records.push(record);
                }
                Err(e) => log.report.corrupt_lines.push(CorruptLine {
                    line: line_num + 1,
                    reason: e.to_string(),
                }),
            }
        }

        file.unlock()
            .map_err(|e| persistence_error("unlock", &log.path, e))?;

        for corrupt in &log.report.corrupt_lines {
            tracing::warn!(
                "Workout log {:?} line {} unreadable: {}",
                log.path,
                corrupt.line,
                corrupt.reason
            );
        }
        tracing::debug!("Read {} sessions from {:?}", log.records.len(), log.path);
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines that were dropped while loading
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| persistence_error("create directory for", &self.path, e))?;
        }
        Ok(())
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        // A crash mid-write can leave a partial last line; start on a fresh one
        let needs_newline = if file.metadata()?.len() > 0 {
            file.seek(SeekFrom::End(-1))?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last)?;
            last[0] != b'\n'
        } else {
            false
        };

        {
            let mut writer = std::io::BufWriter::new(&file);
            if needs_newline {
                writer.write_all(b"\n")?;
            }
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        file.sync_data()?;
        file.unlock()?;
        Ok(())
    }
}

impl WorkoutLogStore for JsonlLog {
    fn append(&mut self, record: SessionRecord) -> Result<()> {
        if self.ids.contains(&record.id) {
            return Err(Error::DuplicateId(record.id));
        }

        self.ensure_parent_dir()?;
        let line = serde_json::to_string(&record)?;
        self.write_line(&line)
            .map_err(|e| persistence_error("append to", &self.path, e))?;

        tracing::debug!("Appended session {} to {:?}", record.id, self.path);
        self.ids.insert(record.id);
        self.records.push(record);
        Ok(())
    }

    fn all(&self) -> &[SessionRecord] {
        &self.records
    }
}

fn persistence_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::Persistence(format!("failed to {} {}: {}", action, path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExerciseSpec, SetTarget, WorkoutPlan};
    use chrono::{Duration, TimeZone};

    fn plan() -> WorkoutPlan {
        WorkoutPlan {
            id: "quick".into(),
            name: "Quick".into(),
            difficulty: Default::default(),
            exercises: vec![ExerciseSpec {
                id: "squat".into(),
                name: "Squat".into(),
                muscles: vec![],
                target: SetTarget::Reps(15),
                sets: 2,
                rest_seconds: 60,
                weight_suggestion: None,
            }],
        }
    }

    fn create_test_record(days_ago: i64) -> SessionRecord {
        let started = Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap() - Duration::days(days_ago);
        let mut record = SessionRecord::skeleton(&plan(), started);
        record.ended_at = Some(started + Duration::minutes(20));
        record.active_duration_seconds = 1200;
        record
    }

    #[test]
    fn test_memory_log_rejects_duplicate_without_corruption() {
        let mut log = MemoryLog::new();
        let record = create_test_record(0);
        log.append(record.clone()).unwrap();

        let mut altered = record.clone();
        altered.note = "changed".into();
        let err = log.append(altered).unwrap_err();

        assert!(matches!(err, Error::DuplicateId(id) if id == record.id));
        assert_eq!(log.all().len(), 1);
        assert_eq!(log.all()[0].note, "");
    }

    #[test]
    fn test_between_is_inclusive() {
        let records: Vec<_> = (0..5).map(create_test_record).collect();
        let log = MemoryLog::from_records(records.clone()).unwrap();

        let found = log.between(records[3].started_at, records[1].started_at);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|r| r.started_at >= records[3].started_at));
    }

    #[test]
    fn test_recent_and_on_date() {
        let records: Vec<_> = (0..3).map(create_test_record).collect();
        let log = MemoryLog::from_records(records.clone()).unwrap();

        let recent = log.recent(2);
        assert_eq!(recent[0].id, records[2].id);
        assert_eq!(recent[1].id, records[1].id);

        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let found = log.on_date(day, &Utc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, records[1].id);
        assert!((log.total_active_hours() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_jsonl_append_and_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("log").join("workouts.jsonl");

        let first = create_test_record(1);
        let second = create_test_record(0);
        {
            let mut log = JsonlLog::open(&path).unwrap();
            log.append(first.clone()).unwrap();
            log.append(second.clone()).unwrap();
        }

        let reopened = JsonlLog::open(&path).unwrap();
        assert!(reopened.load_report().is_clean());
        assert_eq!(reopened.all(), &[first, second]);
    }

    #[test]
    fn test_jsonl_duplicate_does_not_touch_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("workouts.jsonl");
        let record = create_test_record(0);

        let mut log = JsonlLog::open(&path).unwrap();
        log.append(record.clone()).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(matches!(log.append(record), Err(Error::DuplicateId(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_jsonl_reports_corrupt_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("workouts.jsonl");
        let record = create_test_record(0);

        let mut contents = serde_json::to_string(&record).unwrap();
        contents.push_str("\n{ invalid json }\n");
        contents.push_str(&serde_json::to_string(&record).unwrap());
        contents.push('\n');
        std::fs::write(&path, contents).unwrap();

        let log = JsonlLog::open(&path).unwrap();
        assert_eq!(log.all().len(), 1);
        let lines: Vec<_> = log.load_report().corrupt_lines.iter().map(|c| c.line).collect();
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn test_jsonl_recovers_from_partial_last_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("workouts.jsonl");
        std::fs::write(&path, r#"{"id":"00000000-0000-0000-0000-0"#).unwrap();

        let mut log = JsonlLog::open(&path).unwrap();
        assert_eq!(log.load_report().corrupt_lines.len(), 1);

        let record = create_test_record(0);
        log.append(record.clone()).unwrap();

        let reopened = JsonlLog::open(&path).unwrap();
        assert_eq!(reopened.all(), &[record]);
        assert_eq!(reopened.load_report().corrupt_lines.len(), 1);
    }

    #[test]
    fn test_read_missing_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = JsonlLog::open(temp_dir.path().join("nonexistent.jsonl")).unwrap();
        assert!(log.all().is_empty());
        assert!(log.load_report().is_clean());
    }
}
