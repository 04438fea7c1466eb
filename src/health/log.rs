//! Bounded, append-only log of health probe outcomes.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Automatic,
}

/// One probe outcome.
#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub service: String,
    pub route_id: String,
    pub server_url: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    /// Unix millis.
    pub checked_at: u64,
    pub check_type: CheckType,
}

/// Keeps the most recent `capacity` records; older ones are dropped.
#[derive(Debug)]
pub struct HealthLog {
    capacity: usize,
    records: Mutex<VecDeque<HealthRecord>>,
}

impl HealthLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn append(&self, record: HealthRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Newest first, optionally for one service.
    pub fn recent(&self, service: Option<&str>, limit: usize) -> Vec<HealthRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .iter()
            .rev()
            .filter(|r| service.map_or(true, |s| r.service == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
