use std::time::Duration;
use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use shared::types::{CycleSnapshot, ServiceRecord};
use crate::probe::Prober;
use crate::registry_manager::RegistryHandle;

/// How a single pass over the service list ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleSnapshot),
    /// Stopped before probing every service. Must not be applied.
    Aborted { probed: usize, remaining: usize },
}

/// Probe every record once, in order, and group the results failures first.
///
/// Probes run one after another, so completion order is input order. The
/// cancellation token is checked before each probe; a probe already in
/// flight always runs to completion or timeout.
pub async fn run_cycle<P: Prober>(
    records: Vec<ServiceRecord>,
    prober: &P,
    probe_timeout: Duration,
    cancel: &CancellationToken,
) -> CycleOutcome {
    let total = records.len();
    let mut unavailable = Vec::new();
    let mut available = Vec::new();

    for (idx, mut record) in records.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return CycleOutcome::Aborted {
                probed: idx,
                remaining: total - idx,
            };
        }

        let outcome = prober.probe(&record.host, record.port, probe_timeout).await;
        record.record_check(outcome.available, outcome.elapsed.as_secs_f64());
        tracing::debug!(
            "Checked {}:{} ({}) - available: {}, {}s",
            record.host,
            record.port,
            record.label,
            outcome.available,
            record.latency_display()
        );

        if outcome.available {
            available.push(record);
        } else {
            unavailable.push(record);
        }
    }

    let unavailable_count = unavailable.len();
    let mut services = unavailable;
    services.extend(available);

    CycleOutcome::Completed(CycleSnapshot {
        services,
        unavailable_count,
        completed_at: Utc::now(),
    })
}

/// Run one cycle against the registry and write the result back.
///
/// Returns `None` when the cycle was cancelled; the registry is then left
/// exactly as it was before the cycle.
pub async fn run_registry_cycle<P: Prober>(
    registry: &RegistryHandle,
    prober: &P,
    probe_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<CycleSnapshot>> {
    let records = registry.begin_cycle().await?;

    match run_cycle(records, prober, probe_timeout, cancel).await {
        CycleOutcome::Completed(snapshot) => {
            registry.apply_cycle(snapshot.clone()).await?;
            Ok(Some(snapshot))
        }
        CycleOutcome::Aborted { probed, remaining } => {
            tracing::info!(
                "Cycle cancelled after {} probes, {} services not checked",
                probed,
                remaining
            );
            registry.abort_cycle().await?;
            Ok(None)
        }
    }
}
