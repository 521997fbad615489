use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::Result;
use shared::types::{CycleSnapshot, RegistryView, ServiceRecord};
use crate::registry::{hash, store::Registry, store::RegistryError};

/// Commands sent to the registry task
pub enum RegistryCommand {
    ReplaceAll(Vec<ServiceRecord>, oneshot::Sender<Result<usize, RegistryError>>),
    BeginCycle(oneshot::Sender<Result<Vec<ServiceRecord>, RegistryError>>),
    ApplyCycle(CycleSnapshot, oneshot::Sender<Result<(), RegistryError>>),
    AbortCycle(oneshot::Sender<()>),
    Shutdown,
}

/// Watch channels the registry task publishes to after every mutation
pub struct Publishers {
    pub view_tx: watch::Sender<Arc<RegistryView>>,
    pub hash_tx: watch::Sender<String>,
}

impl Publishers {
    /// Create the channels seeded with `registry`'s current state
    pub fn new(registry: &Registry) -> (Self, watch::Receiver<Arc<RegistryView>>, watch::Receiver<String>) {
        let view = registry.view();
        let (hash_tx, hash_rx) = watch::channel(hash::compute_hash(&view));
        let (view_tx, view_rx) = watch::channel(Arc::new(view));
        (Self { view_tx, hash_tx }, view_rx, hash_rx)
    }

    fn publish(&self, registry: &Registry) {
        let view = registry.view();
        let new_hash = hash::compute_hash(&view);
        self.view_tx.send_replace(Arc::new(view));
        // Only wake hash watchers when something visible changed
        self.hash_tx.send_if_modified(|current| {
            if *current == new_hash {
                false
            } else {
                *current = new_hash;
                true
            }
        });
    }
}

/// Handle to interact with the service registry
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn a new registry task owning `registry`. Must be called inside a tokio runtime.
    pub fn spawn(mut registry: Registry, publishers: Publishers) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(64);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    RegistryCommand::ReplaceAll(records, reply) => {
                        let result = registry.replace_all(records);
                        if result.is_ok() {
                            publishers.publish(&registry);
                        }
                        let _ = reply.send(result);
                    }
                    RegistryCommand::BeginCycle(reply) => {
                        let _ = reply.send(registry.begin_cycle());
                    }
                    RegistryCommand::ApplyCycle(snapshot, reply) => {
                        let result = registry.apply_cycle_result(snapshot);
                        if result.is_ok() {
                            publishers.publish(&registry);
                        }
                        let _ = reply.send(result);
                    }
                    RegistryCommand::AbortCycle(reply) => {
                        registry.abort_cycle();
                        let _ = reply.send(());
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry task shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Replace the whole service list. Fails with [`RegistryError::CycleInFlight`]
    /// while a cycle is running.
    pub async fn replace_all(&self, records: Vec<ServiceRecord>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::ReplaceAll(records, reply)).await?;
        Ok(rx.await??)
    }

    /// Start a cycle and get the records to probe, in registry order
    pub async fn begin_cycle(&self) -> Result<Vec<ServiceRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::BeginCycle(reply)).await?;
        Ok(rx.await??)
    }

    /// Write a completed cycle back into the registry
    pub async fn apply_cycle(&self, snapshot: CycleSnapshot) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::ApplyCycle(snapshot, reply)).await?;
        Ok(rx.await??)
    }

    /// Discard a cycle that was cancelled before it finished
    pub async fn abort_cycle(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::AbortCycle(reply)).await?;
        Ok(rx.await?)
    }

    /// Shutdown the registry task
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}

/// Spawn an empty registry and return its handle with the published channels
pub fn spawn_empty() -> (RegistryHandle, watch::Receiver<Arc<RegistryView>>, watch::Receiver<String>) {
    let registry = Registry::new();
    let (publishers, view_rx, hash_rx) = Publishers::new(&registry);
    (RegistryHandle::spawn(registry, publishers), view_rx, hash_rx)
}
