//! Congestion-state and SRTT timelines, both expressed in microseconds
//! relative to the first packet of the sender capture.
use std::time::Duration;

/// A flow entering CA_RECOVERY, and where the congestion state went next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CongestionEvent {
    pub time_us: i64,
    /// State code of the following transition; empty when none was logged.
    pub next_state: String,
    pub next_time_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrttEntry {
    pub time_us: i64,
    /// Smoothed RTT in seconds
    pub srtt: f64,
}

/// Forward-only cursor over the SRTT timeline.
///
/// Packets arrive in capture order, so the cursor never rewinds: every call to
/// [`SrttCursor::advance`] resumes where the previous one stopped.
#[derive(Debug, Clone)]
pub struct SrttCursor {
    entries: Vec<SrttEntry>,
    index: usize,
    current: f64,
}

impl SrttCursor {
    pub fn new(entries: Vec<SrttEntry>) -> Self {
        SrttCursor {
            entries,
            index: 0,
            current: 0.0,
        }
    }

    /// Consume every entry at or before `relative_us` and return the latest value.
    pub fn advance(&mut self, relative_us: i64) -> f64 {
        while let Some(entry) = self.entries.get(self.index) {
            if entry.time_us > relative_us {
                break;
            }
            self.current = entry.srtt;
            self.index += 1;
        }
        self.current
    }

    /// Number of entries consumed so far.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

/// Signed microseconds from `from` to `to`, truncated toward zero.
pub fn micros_between(from: Duration, to: Duration) -> i64 {
    ((to.as_nanos() as i128 - from.as_nanos() as i128) / 1_000) as i64
}

/// Signed seconds from `from` to `to`.
pub fn seconds_between(from: Duration, to: Duration) -> f64 {
    (to.as_nanos() as i128 - from.as_nanos() as i128) as f64 / 1e9
}

/// `base` shifted by a signed microsecond offset, clamped at the epoch.
pub fn offset_by_micros(base: Duration, offset_us: i64) -> Duration {
    let delta = Duration::from_micros(offset_us.unsigned_abs());
    if offset_us >= 0 {
        base.saturating_add(delta)
    } else {
        base.saturating_sub(delta)
    }
}
