// Run ingestion tasks: find the files for each enabled task, parse each file with the task's
// format, and upsert the records.
//
// A file that cannot be read, or that parses to no record, is skipped and counted.  A store error
// ends the run and is returned to the caller, as is a task whose source directory is missing.
// Since records are upserted by natural key a run can be repeated, or interrupted and rerun, without
// creating duplicates.

use crate::{find_logfiles, Config, FileFormat, RecordStore};
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_seen: usize,
    pub saved_records: usize,
    pub skipped_files: usize,
}

impl IngestReport {
    fn add(&mut self, other: IngestReport) {
        self.files_seen += other.files_seen;
        self.saved_records += other.saved_records;
        self.skipped_files += other.skipped_files;
    }
}

/// Upsert every machine in the configuration into the store.

pub async fn sync_machines(store: &dyn RecordStore, config: &Config) -> Result<usize> {
    for m in &config.machines {
        store.upsert_machine(m).await?;
    }
    info!(machines = config.machines.len(), "Synchronized machines");
    Ok(config.machines.len())
}

/// Parse one file and upsert its record.  Returns false if the file was skipped.

pub async fn ingest_file(
    store: &dyn RecordStore,
    machine_id: &str,
    format: FileFormat,
    file_name: &str,
) -> Result<bool> {
    let text = match fs::read_to_string(file_name) {
        Ok(text) => text,
        Err(e) => {
            warn!(file = file_name, error = %e, "Could not read file");
            return Ok(false);
        }
    };
    match format.parse(&text) {
        Some(record) => {
            store.upsert(machine_id, file_name, &record).await?;
            Ok(true)
        }
        None => {
            debug!(file = file_name, "No record in file");
            Ok(false)
        }
    }
}

/// Run every enabled task, or only the tasks for `machine_id` if it is given.  Disabled machines
/// are skipped along with their tasks.

pub async fn process(
    store: &dyn RecordStore,
    config: &Config,
    machine_id: Option<&str>,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for task in &config.tasks {
        if machine_id.is_some_and(|m| m != task.machine_id) {
            continue;
        }
        let machine_enabled = config.machine(&task.machine_id).map_or(false, |m| m.enabled);
        if !task.enabled || !machine_enabled {
            debug!(task = task.task_id.as_str(), "Task disabled");
            continue;
        }
        let dir = config.task_directory(task);
        let task_report = process_dir(store, &task.machine_id, task.format, &dir).await?;
        info!(
            task = task.task_id.as_str(),
            files = task_report.files_seen,
            saved = task_report.saved_records,
            skipped = task_report.skipped_files,
            "Task done"
        );
        report.add(task_report);
    }
    Ok(report)
}

async fn process_dir(
    store: &dyn RecordStore,
    machine_id: &str,
    format: FileFormat,
    dir: &Path,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for file_name in find_logfiles(dir, format.extension())? {
        report.files_seen += 1;
        if ingest_file(store, machine_id, format, &file_name).await? {
            report.saved_records += 1;
        } else {
            report.skipped_files += 1;
        }
    }
    Ok(report)
}
