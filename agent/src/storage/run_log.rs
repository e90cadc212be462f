//! Date-partitioned, append-only run log.
//!
//! Each local calendar day has one partition file named `YYYYMMDD` in the
//! logs directory. Every line is a self-contained record:
//!
//! ```text
//! <deployId>: [{"order":1,"name":"pull","command":"git pull",...}]
//! ```
//!
//! Lookups scan partitions linearly; there is no index file. Readers skip
//! lines that fail to parse, so a trailing partial line left by an
//! in-progress append never breaks a query.

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::models::run::{LogEntry, RunRecord, StepResult};

/// Previous days searched by `find_by_id` after today's partition
pub const LOOKBACK_DAYS: u64 = 7;

const PARTITION_FORMAT: &str = "%Y%m%d";

/// Filters for a partition query
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Maximum records returned
    pub limit: usize,

    /// Substring matched against the deploy ID
    pub app: Option<String>,

    /// Substring matched against the deploy ID
    pub env: Option<String>,

    /// Partition date as `YYYYMMDD`; today when absent
    pub date: Option<String>,
}

/// Result of a partition query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching records, most recently appended first
    pub records: Vec<LogEntry>,

    /// Number of matching records before `limit` was applied
    pub total: usize,
}

/// Append-only run log store
#[derive(Debug)]
pub struct LogStore {
    dir: Dir,
    write_lock: Mutex<()>,
}

impl LogStore {
    pub fn new(dir: Dir) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    /// Today's date in local time
    pub fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    /// Append a finished run to today's partition
    pub async fn append(&self, record: &RunRecord) -> Result<(), AgentError> {
        self.append_on(Self::today(), record).await
    }

    /// Append a finished run to the partition of `date`
    pub async fn append_on(&self, date: NaiveDate, record: &RunRecord) -> Result<(), AgentError> {
        let line = format_line(&record.deploy_id, &record.steps).map_err(|e| {
            AgentError::PersistenceError(format!(
                "Failed to encode run {}: {}",
                record.deploy_id, e
            ))
        })?;

        let file = self.dir.file(&partition_name(date));
        let _lock = self.write_lock.lock().await;
        file.append_line(&line).await.map_err(|e| {
            AgentError::PersistenceError(format!(
                "Failed to append to {}: {}",
                file.path().display(),
                e
            ))
        })?;

        debug!("Appended run {} to {}", record.deploy_id, file.path().display());
        Ok(())
    }

    /// Query one partition: `query.date` if given, today otherwise
    pub async fn query(&self, query: &LogQuery) -> Result<QueryResult, AgentError> {
        let date = match &query.date {
            Some(date) => parse_partition_name(date)?,
            None => Self::today(),
        };

        let entries = self.read_partition(date).await?;
        let matching: Vec<LogEntry> = entries
            .into_iter()
            .rev()
            .filter(|entry| matches_filter(&entry.deploy_id, query.app.as_deref()))
            .filter(|entry| matches_filter(&entry.deploy_id, query.env.as_deref()))
            .collect();

        let total = matching.len();
        let records = matching.into_iter().take(query.limit).collect();
        Ok(QueryResult { records, total })
    }

    /// Find a run in today's partition or one of the previous seven days
    pub async fn find_by_id(&self, deploy_id: &str) -> Result<Option<LogEntry>, AgentError> {
        self.find_by_id_from(Self::today(), deploy_id).await
    }

    /// `find_by_id` with an explicit starting day
    pub async fn find_by_id_from(
        &self,
        today: NaiveDate,
        deploy_id: &str,
    ) -> Result<Option<LogEntry>, AgentError> {
        for days_back in 0..=LOOKBACK_DAYS {
            let Some(date) = today.checked_sub_days(Days::new(days_back)) else {
                break;
            };
            let entries = match self.read_partition(date).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping partition {} in lookup: {}", partition_name(date), e);
                    continue;
                }
            };
            if let Some(found) = entries.into_iter().find(|entry| entry.deploy_id == deploy_id) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Dates of the partitions on disk, newest first
    pub async fn partitions(&self) -> Result<Vec<String>, AgentError> {
        let names = self
            .dir
            .list_file_names()
            .await
            .map_err(|e| AgentError::PersistenceError(e.to_string()))?;

        let mut dates: Vec<String> = names
            .into_iter()
            .filter(|name| parse_partition_name(name).is_ok())
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    async fn read_partition(&self, date: NaiveDate) -> Result<Vec<LogEntry>, AgentError> {
        let file = self.dir.file(&partition_name(date));
        let contents = file.read_string_if_exists().await.map_err(|e| {
            AgentError::PersistenceError(format!(
                "Failed to read {}: {}",
                file.path().display(),
                e
            ))
        })?;

        let Some(contents) = contents else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(entry) => entries.push(entry),
                None => warn!("Skipping unreadable line {} in {}", i + 1, file.path().display()),
            }
        }
        Ok(entries)
    }
}

/// Partition file name for a date
pub fn partition_name(date: NaiveDate) -> String {
    date.format(PARTITION_FORMAT).to_string()
}

/// Parse a strict `YYYYMMDD` partition name
pub fn parse_partition_name(name: &str) -> Result<NaiveDate, AgentError> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AgentError::ValidationError(format!(
            "Invalid date {:?}, expected YYYYMMDD",
            name
        )));
    }
    NaiveDate::parse_from_str(name, PARTITION_FORMAT).map_err(|e| {
        AgentError::ValidationError(format!("Invalid date {:?}: {}", name, e))
    })
}

/// Encode one partition line (without the trailing newline)
pub fn format_line(deploy_id: &str, steps: &[StepResult]) -> Result<String, serde_json::Error> {
    Ok(format!("{}: {}", deploy_id, serde_json::to_string(steps)?))
}

/// Decode one partition line; `None` if it is malformed
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let (deploy_id, json) = line.trim_end_matches('\r').split_once(": ")?;
    if deploy_id.is_empty() {
        return None;
    }
    let steps: Vec<StepResult> = serde_json::from_str(json).ok()?;
    Some(LogEntry {
        deploy_id: deploy_id.to_string(),
        steps,
    })
}

fn matches_filter(deploy_id: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(filter) if !filter.is_empty() => deploy_id.contains(filter),
        _ => true,
    }
}
