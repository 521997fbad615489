use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

/// Outcome of a single connect attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub available: bool,
    pub elapsed: Duration,
}

/// Tests whether a host accepts TCP connections on a port.
///
/// Implementations never fail: every network error is reported as
/// `available == false`. Callers validate host and port beforehand.
pub trait Prober: Send + Sync + 'static {
    fn probe(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Connect-and-close prober backed by tokio's TCP stack
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16, limit: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let available = match timeout(limit, TcpStream::connect((host, port))).await {
            // Stream dropped here, closing the connection
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::debug!("Connect to {}:{} failed: {}", host, port, e);
                false
            }
            Err(_) => {
                tracing::debug!("Connect to {}:{} timed out after {:?}", host, port, limit);
                false
            }
        };

        ProbeOutcome {
            available,
            elapsed: started.elapsed(),
        }
    }
}
