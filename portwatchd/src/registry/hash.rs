use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::{RegistryView, ServiceStatus};

/// Only fields a table view would re-render for. Latency and cycle timestamps
/// change on every cycle and are left out.
#[derive(Serialize)]
struct HashRow<'a> {
    host: &'a str,
    port: u16,
    label: &'a str,
    status: ServiceStatus,
}

#[derive(Serialize)]
struct HashView<'a> {
    rows: Vec<HashRow<'a>>,
    unavailable_count: Option<usize>,
}

/// Computes a SHA-256 fingerprint of a registry view.
/// Order is part of the view, so rows are hashed as listed.
pub fn compute_hash(view: &RegistryView) -> String {
    let hashed = HashView {
        rows: view
            .services
            .iter()
            .map(|s| HashRow {
                host: &s.host,
                port: s.port,
                label: &s.label,
                status: s.status,
            })
            .collect(),
        unavailable_count: view.unavailable_count,
    };

    let json = serde_json::to_string(&hashed)
        .expect("Failed to serialize registry view for hashing");

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}
