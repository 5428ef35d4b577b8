//! Append-only run ledger.
//!
//! Every status transition and escalation of a run is appended here in
//! the order it happened. The ledger is shared between the dispatcher and
//! whoever audits the run; appends go through a single mutex so concurrent
//! writers never interleave. When backed by a file, each entry is also
//! written as one JSON line and flushed before the append returns.

use crate::core::task::{TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::escalation::EscalationEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};
use uuid::Uuid;

/// One status transition of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub task_id: TaskId,
    pub from_status: TaskStatus,
    pub to_status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    /// Attempt the transition belongs to; 0 before the first attempt.
    pub attempt_number: u32,
    /// Free text such as an executor failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Attempt duration, set when an attempt finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl RunRecord {
    pub fn new(task_id: TaskId, from: TaskStatus, to: TaskStatus, attempt_number: u32) -> Self {
        Self {
            task_id,
            from_status: from,
            to_status: to,
            timestamp: Utc::now(),
            attempt_number,
            detail: None,
            elapsed_ms: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}

/// Payload of a ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum LedgerEvent {
    Transition(RunRecord),
    Escalation(EscalationEvent),
}

/// A sequenced ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub run_id: Uuid,
    /// Position in the ledger, starting at 0.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

struct LedgerInner {
    entries: Vec<LedgerEntry>,
    sink: Option<BufWriter<File>>,
}

/// Append-only log of everything that happened during a run.
pub struct RunLedger {
    run_id: Uuid,
    path: Option<PathBuf>,
    inner: Mutex<LedgerInner>,
}

impl RunLedger {
    /// In-memory ledger with a fresh run id.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            path: None,
            inner: Mutex::new(LedgerInner {
                entries: Vec::new(),
                sink: None,
            }),
        }
    }

    /// Ledger that mirrors every entry to `path` as NDJSON.
    ///
    /// The file is created if missing and appended to otherwise.
    pub fn with_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), "ledger file opened");
        let mut ledger = Self::new();
        ledger.path = Some(path.to_path_buf());
        ledger.lock().sink = Some(BufWriter::new(file));
        Ok(ledger)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // A panic while holding the lock cannot leave a half-written entry
        // in memory, so the data is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append(&self, event: LedgerEvent) -> Result<u64> {
        let mut inner = self.lock();
        let entry = LedgerEntry {
            run_id: self.run_id,
            sequence: inner.entries.len() as u64,
            event,
        };
        if let Some(sink) = inner.sink.as_mut() {
            serde_json::to_writer(&mut *sink, &entry)?;
            sink.write_all(b"\n")?;
            sink.flush()?;
        }
        trace!(sequence = entry.sequence, "ledger append");
        let sequence = entry.sequence;
        inner.entries.push(entry);
        Ok(sequence)
    }

    /// Append a status transition. Returns its sequence number.
    pub fn record_transition(&self, record: RunRecord) -> Result<u64> {
        self.append(LedgerEvent::Transition(record))
    }

    /// Append an escalation. Returns its sequence number.
    pub fn record_escalation(&self, event: EscalationEvent) -> Result<u64> {
        self.append(LedgerEvent::Escalation(event))
    }

    /// Copy of all entries in append order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().entries.clone()
    }

    /// Status transitions only, in append order.
    pub fn records(&self) -> Vec<RunRecord> {
        records_of(&self.lock().entries)
    }

    /// Transitions of a single task, in append order.
    pub fn records_for(&self, task_id: &TaskId) -> Vec<RunRecord> {
        self.records()
            .into_iter()
            .filter(|r| &r.task_id == task_id)
            .collect()
    }

    pub fn escalations(&self) -> Vec<EscalationEvent> {
        self.lock()
            .entries
            .iter()
            .filter_map(|e| match &e.event {
                LedgerEvent::Escalation(esc) => Some(esc.clone()),
                LedgerEvent::Transition(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Write all entries as newline-delimited JSON.
    pub fn write_ndjson<W: Write>(&self, mut writer: W) -> Result<()> {
        let inner = self.lock();
        for entry in &inner.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// All entries as a newline-delimited JSON string.
    pub fn export_ndjson(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_ndjson(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::InternalConsistency(e.to_string()))
    }

    /// Parse an exported ledger. Blank lines are ignored.
    ///
    /// # Errors
    /// `Json` for a malformed line, `InternalConsistency` if sequence
    /// numbers of a run are out of order.
    pub fn from_ndjson(input: &str) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = Vec::new();
        let mut next_sequence: BTreeMap<Uuid, u64> = BTreeMap::new();
        for line in input.lines().filter(|l| !l.trim().is_empty()) {
            let entry: LedgerEntry = serde_json::from_str(line)?;
            let expected = next_sequence.entry(entry.run_id).or_insert(0);
            if entry.sequence != *expected {
                return Err(Error::InternalConsistency(format!(
                    "ledger run {} expected sequence {} but found {}",
                    entry.run_id, expected, entry.sequence
                )));
            }
            *expected += 1;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Load a ledger file written by [`RunLedger::with_file`].
    pub fn load(path: &Path) -> Result<Vec<LedgerEntry>> {
        Self::from_ndjson(&std::fs::read_to_string(path)?)
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLedger")
            .field("run_id", &self.run_id)
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

fn records_of(entries: &[LedgerEntry]) -> Vec<RunRecord> {
    entries
        .iter()
        .filter_map(|e| match &e.event {
            LedgerEvent::Transition(record) => Some(record.clone()),
            LedgerEvent::Escalation(_) => None,
        })
        .collect()
}

/// Rebuild the final status of every task from ledger entries.
///
/// Tasks listed in `tasks` that never transitioned are reported as
/// `pending`, matching their status at graph build time.
pub fn replay<I>(entries: &[LedgerEntry], tasks: I) -> Result<BTreeMap<TaskId, TaskStatus>>
where
    I: IntoIterator<Item = TaskId>,
{
    let mut statuses: BTreeMap<TaskId, TaskStatus> = tasks
        .into_iter()
        .map(|id| (id, TaskStatus::Pending))
        .collect();

    for record in records_of(entries) {
        let current = statuses
            .entry(record.task_id.clone())
            .or_insert(TaskStatus::Pending);
        if *current != record.from_status {
            return Err(Error::InternalConsistency(format!(
                "ledger replay: task {} is {} but record starts from {}",
                record.task_id, current, record.from_status
            )));
        }
        *current = record.to_status;
    }
    Ok(statuses)
}
