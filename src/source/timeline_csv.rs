use crate::analysis::{CongestionEvent, SrttEntry};
use crate::config::RECOVERY_STATE;
use crate::error::{Error, Result};
use crate::source::{EventSource, SrttSource};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads every row after the header. A missing header is fatal; rows the CSV
/// reader itself rejects are skipped.
fn read_rows(path: &Path) -> Result<Vec<StringRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let mut records = reader.records();

    match records.next() {
        Some(header) => {
            header?;
        }
        None => return Err(Error::MissingHeader(path.to_path_buf())),
    }

    let mut rows = Vec::new();
    for (n, record) in records.enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(err) => warn!("{}: skipping row {}: {}", path.display(), n + 2, err),
        }
    }
    Ok(rows)
}

fn parse_time(row: &StringRecord) -> Option<i64> {
    row.get(0)?.parse().ok()
}

/// Congestion-state log with `time_us,state` rows.
///
/// Each row entering the recovery state becomes one event, paired with the
/// first later row whose state differs.
#[derive(Debug, Clone)]
pub struct CsvEventLoader {
    path: PathBuf,
    recovery_state: String,
}

impl CsvEventLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CsvEventLoader {
            path: path.as_ref().to_path_buf(),
            recovery_state: RECOVERY_STATE.to_string(),
        }
    }

    pub fn with_recovery_state(mut self, state: impl Into<String>) -> Self {
        self.recovery_state = state.into();
        self
    }
}

impl EventSource for CsvEventLoader {
    fn load_events(&mut self) -> Result<Vec<CongestionEvent>> {
        let rows = read_rows(&self.path)?;
        let recovery = self.recovery_state.as_str();
        let mut events = Vec::new();

        for (i, row) in rows.iter().enumerate() {
            if row.get(1) != Some(recovery) {
                continue;
            }
            let time_us = match parse_time(row) {
                Some(t) => t,
                None => {
                    warn!("{}: bad time in row {:?}", self.path.display(), row);
                    continue;
                }
            };
            let (next_state, next_time_us) = rows[i + 1..]
                .iter()
                .find_map(|next| match next.get(1) {
                    Some(state) if state != recovery => {
                        Some((state.to_string(), parse_time(next).unwrap_or(0)))
                    }
                    _ => None,
                })
                .unwrap_or_default();

            events.push(CongestionEvent {
                time_us,
                next_state,
                next_time_us,
            });
        }

        events.sort_by_key(|e| e.time_us);
        debug!("{}: {} recovery events", self.path.display(), events.len());
        Ok(events)
    }
}

/// SRTT log with `time_us,srtt_seconds` rows.
#[derive(Debug, Clone)]
pub struct CsvSrttLoader {
    path: PathBuf,
}

impl CsvSrttLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CsvSrttLoader {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SrttSource for CsvSrttLoader {
    fn load_srtt_entries(&mut self) -> Result<Vec<SrttEntry>> {
        let rows = read_rows(&self.path)?;
        let total = rows.len();

        let mut entries: Vec<SrttEntry> = rows
            .iter()
            .filter_map(|row| {
                let time_us = parse_time(row)?;
                let srtt = row.get(1)?.parse().ok()?;
                Some(SrttEntry { time_us, srtt })
            })
            .collect();
        if entries.len() < total {
            warn!(
                "{}: skipped {} malformed rows",
                self.path.display(),
                total - entries.len()
            );
        }

        entries.sort_by_key(|e| e.time_us);
        Ok(entries)
    }
}
