//! Host port allocation for sandbox instances
//!
//! A port is handed out only if it is not already pending in this process and
//! the OS lets us bind it, which also catches ports taken by containers this
//! process never created.

use std::collections::BTreeSet;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{Result, SandboxError};

/// Reserves ports from a fixed inclusive range.
#[derive(Debug)]
pub struct PortAllocator {
    host: String,
    start: u16,
    end: u16,
    pending: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    /// Create an allocator over `start..=end`, bind-testing on `host`.
    pub fn new(host: impl Into<String>, start: u16, end: u16) -> Self {
        PortAllocator {
            host: host.into(),
            start,
            end,
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Reserve the lowest port that is neither pending nor bound.
    ///
    /// The pending set stays locked for the whole scan so concurrent
    /// reservations never see the same free port.
    pub async fn reserve(&self) -> Result<u16> {
        let mut pending = self.pending.lock().await;
        for port in self.start..=self.end {
            if pending.contains(&port) {
                continue;
            }
            if is_port_bindable(&self.host, port).await {
                pending.insert(port);
                debug!("Reserved port {}", port);
                return Ok(port);
            }
        }
        Err(SandboxError::PortExhausted {
            start: self.start,
            end: self.end,
        })
    }

    /// Return a port to the pool. Releasing an unknown port is a no-op.
    pub async fn release(&self, port: u16) {
        if self.pending.lock().await.remove(&port) {
            debug!("Released port {}", port);
        }
    }

    /// Ports currently reserved, ascending.
    pub async fn reserved(&self) -> Vec<u16> {
        self.pending.lock().await.iter().copied().collect()
    }
}

/// Check if a port is available by attempting to bind to it
async fn is_port_bindable(host: &str, port: u16) -> bool {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reserve_release_reserve_returns_same_port() {
        let allocator = PortAllocator::new("127.0.0.1", 47310, 47319);
        let first = allocator.reserve().await.unwrap();
        allocator.release(first).await;
        let second = allocator.reserve().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_pending_port_not_handed_out_twice() {
        let allocator = Arc::new(PortAllocator::new("127.0.0.1", 47320, 47339));
        let a = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.reserve().await })
        };
        let b = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.reserve().await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(allocator.reserved().await.len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_when_port_bound_elsewhere() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let taken = listener.local_addr().unwrap().port();
        let allocator = PortAllocator::new("127.0.0.1", taken, taken);

        let err = allocator.reserve().await.unwrap_err();
        assert!(matches!(err, SandboxError::PortExhausted { .. }));
    }

    #[tokio::test]
    async fn test_exhaustion_when_all_pending() {
        let allocator = PortAllocator::new("127.0.0.1", 47340, 47340);
        allocator.reserve().await.unwrap();
        assert!(allocator.reserve().await.is_err());
    }

    #[tokio::test]
    async fn test_release_unknown_port_is_noop() {
        let allocator = PortAllocator::new("127.0.0.1", 47350, 47351);
        allocator.release(47350).await;
        allocator.release(1).await;
        assert!(allocator.reserved().await.is_empty());
    }
}
