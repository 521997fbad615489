use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::protocol::LATENCY_NOT_AVAILABLE;

/// Reachability of a monitored service as of the last completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Unknown,
    Available,
    Unavailable,
}

impl ServiceStatus {
    pub fn from_available(available: bool) -> Self {
        if available {
            ServiceStatus::Available
        } else {
            ServiceStatus::Unavailable
        }
    }
}

/// A monitored host/port pair.
/// This is the canonical data model used by the registry, the cycle runner and the API.
/// Records are identified by position; duplicates are independent entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Hostname or IP address, e.g. "10.0.0.1"
    pub host: String,

    /// TCP port, never 0
    pub port: u16,

    /// Free-form description, e.g. "web"
    pub label: String,

    /// Status from the most recently completed cycle
    pub status: ServiceStatus,

    /// Connect latency in seconds, millisecond precision
    pub last_latency_secs: Option<f64>,
}

impl ServiceRecord {
    /// A freshly imported record that has not been probed yet
    pub fn new(host: impl Into<String>, port: u16, label: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            label: label.into(),
            status: ServiceStatus::Unknown,
            last_latency_secs: None,
        }
    }

    /// Record the outcome of one probe.
    pub fn record_check(&mut self, available: bool, elapsed_secs: f64) {
        self.status = ServiceStatus::from_available(available);
        self.last_latency_secs = Some(round_latency(elapsed_secs));
    }

    /// Latency formatted to three decimals, or "N/A" before the first check.
    pub fn latency_display(&self) -> String {
        match self.last_latency_secs {
            Some(secs) => format!("{:.3}", secs),
            None => LATENCY_NOT_AVAILABLE.to_string(),
        }
    }
}

/// Round a latency to millisecond precision.
pub fn round_latency(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

/// Result of one completed cycle: failures first, then successes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub services: Vec<ServiceRecord>,
    pub unavailable_count: usize,
    pub completed_at: DateTime<Utc>,
}

/// The externally observable state of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryView {
    pub services: Vec<ServiceRecord>,

    /// Absent until a cycle completes after the last import
    pub unavailable_count: Option<usize>,

    /// Completion time of the last applied cycle
    pub last_cycle_at: Option<DateTime<Utc>>,
}
