use chrono::{DateTime, Utc};
use shared::types::{CycleSnapshot, RegistryView, ServiceRecord};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a check cycle is in flight")]
    CycleInFlight,
    #[error("no check cycle is in flight")]
    NoCycleInFlight,
    #[error("cycle result has {got} services, registry has {expected}")]
    SnapshotMismatch { expected: usize, got: usize },
}

/// Ordered list of monitored services and their last-known state.
///
/// Not thread-safe on its own; owned by the registry task and reached
/// through [`crate::registry_manager::RegistryHandle`].
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<ServiceRecord>,
    unavailable_count: Option<usize>,
    last_cycle_at: Option<DateTime<Utc>>,
    cycle_in_flight: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every record, discarding status history. Returns the new length.
    ///
    /// Refused while a cycle is running so a write-back can never land on a
    /// different service list than the one it probed.
    pub fn replace_all(&mut self, records: Vec<ServiceRecord>) -> Result<usize, RegistryError> {
        if self.cycle_in_flight {
            return Err(RegistryError::CycleInFlight);
        }

        self.records = records
            .into_iter()
            .map(|r| ServiceRecord::new(r.host, r.port, r.label))
            .collect();
        self.unavailable_count = None;
        self.last_cycle_at = None;
        Ok(self.records.len())
    }

    /// Mark a cycle as started and hand out the records it should probe.
    pub fn begin_cycle(&mut self) -> Result<Vec<ServiceRecord>, RegistryError> {
        if self.cycle_in_flight {
            return Err(RegistryError::CycleInFlight);
        }
        self.cycle_in_flight = true;
        Ok(self.records.clone())
    }

    /// Write back a completed cycle: new order, statuses and latencies.
    pub fn apply_cycle_result(&mut self, snapshot: CycleSnapshot) -> Result<(), RegistryError> {
        if !self.cycle_in_flight {
            return Err(RegistryError::NoCycleInFlight);
        }
        self.cycle_in_flight = false;

        if snapshot.services.len() != self.records.len() {
            return Err(RegistryError::SnapshotMismatch {
                expected: self.records.len(),
                got: snapshot.services.len(),
            });
        }

        self.records = snapshot.services;
        self.unavailable_count = Some(snapshot.unavailable_count);
        self.last_cycle_at = Some(snapshot.completed_at);
        Ok(())
    }

    /// Drop an aborted cycle without touching any record.
    pub fn abort_cycle(&mut self) {
        self.cycle_in_flight = false;
    }

    pub fn view(&self) -> RegistryView {
        RegistryView {
            services: self.records.clone(),
            unavailable_count: self.unavailable_count,
            last_cycle_at: self.last_cycle_at,
        }
    }
}
