//! Periodic-task scheduling with crash-safe persistence.
//!
//! Each task's next-due timestamp is persisted as its own small JSON record
//! so a corrupt or missing file for one task never blocks the other. Writes
//! replace the whole file via a rename, so the next startup can never see a
//! torn record.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A named periodic task owned by the orchestrator
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: &'static str,
    pub interval: Duration,
    pub jitter: Duration,
    /// Absolute epoch seconds of the next run
    pub next_due: i64,
}

impl ScheduledTask {
    /// New task, due immediately
    pub fn new(name: &'static str, interval: Duration, jitter: Duration, now: i64) -> Self {
        Self {
            name,
            interval,
            jitter,
            next_due: now,
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.next_due <= now
    }

    /// Schedule the next run at `now + interval` plus a symmetric random
    /// jitter offset
    pub fn reschedule(&mut self, now: i64) {
        let jitter = self.jitter.as_secs() as i64;
        let offset = if jitter > 0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0
        };
        self.next_due = now + self.interval.as_secs() as i64 + offset;
        debug!(
            "Task '{}' rescheduled for {} ({}s away)",
            self.name,
            self.next_due,
            self.next_due - now
        );
    }

    /// Apply a persisted timestamp. A value in the past is clamped to `now`
    /// so a long outage does not bunch missed runs into a burst; a value in
    /// the future is honored as-is; no record means due immediately.
    pub fn restore(&mut self, loaded: Option<i64>, now: i64) {
        self.next_due = match loaded {
            Some(ts) if ts > now => {
                info!("Task '{}' restored, due in {}s", self.name, ts - now);
                ts
            }
            Some(ts) => {
                info!(
                    "Task '{}' was overdue by {}s, clamping to now",
                    self.name,
                    now - ts
                );
                now
            }
            None => {
                info!("No prior schedule for task '{}', due now", self.name);
                now
            }
        };
    }
}

/// On-disk record for one task
#[derive(Debug, Serialize, Deserialize)]
struct ScheduleRecord {
    task: String,
    next_due: i64,
}

/// Persists per-task next-due timestamps across process restarts
pub struct ScheduleStore {
    dir: PathBuf,
}

impl ScheduleStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, task_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", task_name))
    }

    /// Load the persisted timestamp for a task. Missing files and malformed
    /// records both mean "no prior schedule", never an error.
    pub fn load(&self, task_name: &str) -> Option<i64> {
        let path = self.path(task_name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No schedule record at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<ScheduleRecord>(&raw) {
            Ok(record) => Some(record.next_due),
            Err(e) => {
                warn!(
                    "Ignoring corrupt schedule record {}: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist a task's timestamp as a whole-file replacement
    pub fn save(&self, task_name: &str, next_due: i64) -> Result<()> {
        let record = ScheduleRecord {
            task: task_name.to_string(),
            next_due,
        };
        let json = serde_json::to_string_pretty(&record)?;

        let path = self.path(task_name);
        let tmp = self.dir.join(format!("{}.json.tmp", task_name));
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!("Persisted '{}' next_due={}", task_name, next_due);
        Ok(())
    }
}

#[cfg(test)]
#[path = "schedule_test.rs"]
mod schedule_test;
