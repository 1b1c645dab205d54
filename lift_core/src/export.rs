//! Export and import of the workout log.
//!
//! JSON bundles carry the whole log and can be imported into another data
//! directory; CSV export rewrites one summary row per session for
//! spreadsheets.

use crate::store::WorkoutLogStore;
use crate::types::{SessionRecord, SetStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Format version written into every bundle
pub const EXPORT_VERSION: &str = "1.0.0";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleOut<'a> {
    workouts: &'a [SessionRecord],
    exported_at: DateTime<Utc>,
    version: &'static str,
}

/// A parsed export bundle
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub workouts: Vec<SessionRecord>,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Outcome of an import
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
}

/// Write `records` as a JSON bundle
pub fn export_json<W: Write>(records: &[SessionRecord], exported_at: DateTime<Utc>, writer: W) -> Result<()> {
    let bundle = BundleOut {
        workouts: records,
        exported_at,
        version: EXPORT_VERSION,
    };
    serde_json::to_writer_pretty(writer, &bundle)?;
    Ok(())
}

/// Write through `fill` into a temp file beside `path`, then rename it over
/// `path`. Readers see either the old file or the new one, never a mix.
fn replace_file<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut std::io::BufWriter<&std::fs::File>) -> Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        fill(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Write a JSON bundle to `path`, replacing any existing file atomically
pub fn export_json_file(records: &[SessionRecord], exported_at: DateTime<Utc>, path: &Path) -> Result<()> {
    replace_file(path, |writer| export_json(records, exported_at, writer))?;

    tracing::info!("Exported {} sessions to {:?}", records.len(), path);
    Ok(())
}

/// Append every record from a bundle that `store` does not already hold.
/// Existing records are never replaced.
pub fn import_json<R: Read, S: WorkoutLogStore>(reader: R, store: &mut S) -> Result<ImportSummary> {
    let bundle: ExportBundle = serde_json::from_reader(reader)?;

    match bundle.version.as_deref() {
        Some(version) if !version.starts_with("1.") => {
            return Err(Error::Other(format!(
                "unsupported export version {version}"
            )));
        }
        None => tracing::warn!("Import bundle has no version, assuming {}", EXPORT_VERSION),
        _ => {}
    }

    let mut summary = ImportSummary::default();
    for record in bundle.workouts {
        if store.contains(record.id) {
            tracing::debug!("Skipping session {} already in the log", record.id);
            summary.duplicates += 1;
            continue;
        }
        match store.append(record) {
            Ok(()) => summary.imported += 1,
            // Same id twice inside one bundle
            Err(Error::DuplicateId(_)) => summary.duplicates += 1,
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        "Imported {} sessions ({} duplicates skipped)",
        summary.imported,
        summary.duplicates
    );
    Ok(summary)
}

pub fn import_json_file<S: WorkoutLogStore>(path: &Path, store: &mut S) -> Result<ImportSummary> {
    let file = std::fs::File::open(path)?;
    import_json(std::io::BufReader::new(file), store)
}

const CSV_HEADERS: [&str; 9] = [
    "id",
    "planId",
    "startedAt",
    "endedAt",
    "activeDurationSeconds",
    "setsCompleted",
    "setsSkipped",
    "setsTotal",
    "note",
];

/// A row in the CSV output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow {
    id: String,
    plan_id: String,
    started_at: String,
    ended_at: Option<String>,
    active_duration_seconds: u64,
    sets_completed: usize,
    sets_skipped: usize,
    sets_total: usize,
    note: String,
}

impl From<&SessionRecord> for CsvRow {
    fn from(record: &SessionRecord) -> Self {
        CsvRow {
            id: record.id.to_string(),
            plan_id: record.plan_id.clone(),
            started_at: record.started_at.to_rfc3339(),
            ended_at: record.ended_at.map(|t| t.to_rfc3339()),
            active_duration_seconds: record.active_duration_seconds,
            sets_completed: record.count_sets(SetStatus::Completed),
            sets_skipped: record.count_sets(SetStatus::Skipped),
            sets_total: record.total_sets(),
            note: record.note.clone(),
        }
    }
}

/// Write one row per record to the CSV at `path`, replacing whatever the
/// file held before. The header row is always present, so an empty log
/// still produces a valid CSV.
pub fn export_csv(records: &[SessionRecord], path: &Path) -> Result<usize> {
    replace_file(path, |out| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        writer.write_record(CSV_HEADERS)?;
        for record in records {
            writer.serialize(CsvRow::from(record))?;
        }
        writer.flush()?;
        Ok(())
    })?;

    tracing::info!("Wrote {} sessions to CSV {:?}", records.len(), path);
    Ok(records.len())
}
