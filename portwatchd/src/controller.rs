use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use shared::protocol::DEFAULT_INTERVAL_SECS;
use shared::types::{RegistryView, ServiceRecord};
use crate::config::{positive_secs, MonitorConfig};
use crate::cycle;
use crate::probe::Prober;
use crate::registry_manager::RegistryHandle;

/// Settings fixed for the lifetime of the controller
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub probe_timeout: Duration,
    pub pause_slice: Duration,
}

impl From<&MonitorConfig> for LoopSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            pause_slice: config.pause_slice(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartOutcome {
    Started { interval: Duration },
    AlreadyRunning { interval: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl RunningLoop {
    /// A loop that ended on its own after a fault counts as stopped
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Interval from a number of seconds, or the default when not a positive finite number
pub fn interval_from_secs(secs: f64) -> Duration {
    positive_secs(secs).unwrap_or_else(|| {
        tracing::warn!("Invalid interval {}, using {}s", secs, DEFAULT_INTERVAL_SECS);
        default_interval()
    })
}

/// Interval from user text such as "2.5", or the default when unparsable
pub fn interval_from_str(raw: &str) -> Duration {
    match raw.trim().parse::<f64>() {
        Ok(secs) => interval_from_secs(secs),
        Err(_) => {
            tracing::warn!("Unparsable interval {:?}, using {}s", raw, DEFAULT_INTERVAL_SECS);
            default_interval()
        }
    }
}

pub fn default_interval() -> Duration {
    Duration::from_secs_f64(DEFAULT_INTERVAL_SECS)
}

/// Sleep for `total` in slices of at most `slice`, checking `cancel` before
/// each one. Returns false if cancelled.
///
/// A `total` too long to represent as a deadline only ends on cancel.
pub async fn pause(total: Duration, slice: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now().checked_add(total);
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let step = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                slice.min(deadline - now)
            }
            None => slice,
        };
        tokio::time::sleep(step).await;
    }
}

/// Starts and stops the background monitoring loop.
///
/// At most one loop exists at a time. A loop stays in the slot until it has
/// been joined, so a `start` never overlaps a cycle that is still finishing,
/// even when an earlier `stop` was abandoned halfway.
pub struct Controller<P: Prober> {
    registry: RegistryHandle,
    view_rx: watch::Receiver<Arc<RegistryView>>,
    prober: Arc<P>,
    settings: LoopSettings,
    running: Mutex<Option<RunningLoop>>,
    /// Interval of the live loop; readable without waiting on `running`
    state_tx: Arc<watch::Sender<Option<Duration>>>,
}

impl<P: Prober> Controller<P> {
    pub fn new(
        registry: RegistryHandle,
        view_rx: watch::Receiver<Arc<RegistryView>>,
        prober: Arc<P>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            registry,
            view_rx,
            prober,
            settings,
            running: Mutex::new(None),
            state_tx: Arc::new(watch::channel(None).0),
        }
    }

    /// Begin checking every `interval`. A no-op while already running.
    pub async fn start(&self, interval: Duration) -> StartOutcome {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_mut() {
            if current.is_alive() && !current.cancel.is_cancelled() {
                tracing::debug!("Start requested while already running");
                return StartOutcome::AlreadyRunning {
                    interval: current.interval,
                };
            }
            // Left behind by a stop nobody waited for
            current.cancel.cancel();
            if let Err(e) = (&mut current.handle).await {
                tracing::error!("Monitoring loop panicked: {}", e);
            }
        }

        let cancel = CancellationToken::new();
        self.state_tx.send_replace(Some(interval));
        let handle = tokio::spawn(run_loop(
            self.registry.clone(),
            self.prober.clone(),
            self.settings,
            interval,
            cancel.clone(),
            self.state_tx.clone(),
        ));
        *running = Some(RunningLoop {
            cancel,
            handle,
            interval,
        });

        StartOutcome::Started { interval }
    }

    /// Signal the loop to stop and wait until it has.
    ///
    /// Returns within one probe timeout plus one pause slice. The loop is only
    /// cleared from the slot once joined, so dropping this future early leaves
    /// it for the next `start` or `stop` to finish off.
    pub async fn stop(&self) -> StopOutcome {
        let mut running = self.running.lock().await;
        let Some(current) = running.as_mut() else {
            return StopOutcome::NotRunning;
        };

        let was_alive = current.is_alive();
        current.cancel.cancel();
        self.state_tx.send_replace(None);
        if let Err(e) = (&mut current.handle).await {
            tracing::error!("Monitoring loop panicked: {}", e);
        }
        *running = None;

        if was_alive {
            StopOutcome::Stopped
        } else {
            StopOutcome::NotRunning
        }
    }

    /// Interval of the running loop, if any. Never waits on a pending stop.
    pub fn running_interval(&self) -> Option<Duration> {
        *self.state_tx.borrow()
    }

    /// Latest published registry state. Never observes a partly applied cycle.
    pub fn current_snapshot(&self) -> Arc<RegistryView> {
        self.view_rx.borrow().clone()
    }

    /// Replace the service list. Rejected while a cycle is in flight.
    pub async fn import(&self, records: Vec<ServiceRecord>) -> Result<usize> {
        self.registry.replace_all(records).await
    }
}

async fn run_loop<P: Prober>(
    registry: RegistryHandle,
    prober: Arc<P>,
    settings: LoopSettings,
    interval: Duration,
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<Option<Duration>>>,
) {
    tracing::info!("Monitoring started, interval {:?}", interval);
    let mut cycles: u64 = 0;

    while !cancel.is_cancelled() {
        match cycle::run_registry_cycle(&registry, prober.as_ref(), settings.probe_timeout, &cancel).await {
            Ok(Some(snapshot)) => {
                cycles += 1;
                tracing::info!(
                    "Cycle {} complete: {} of {} services unavailable",
                    cycles,
                    snapshot.unavailable_count,
                    snapshot.services.len()
                );
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Monitoring cycle failed, stopping: {:#}", e);
                break;
            }
        }

        if !pause(interval, settings.pause_slice, &cancel).await {
            break;
        }
    }

    state_tx.send_replace(None);
    tracing::info!("Monitoring stopped after {} cycles", cycles);
}
