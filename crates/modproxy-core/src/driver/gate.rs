//! Bound on concurrent toolchain invocations.

use tokio::sync::{Semaphore, SemaphorePermit};

/// Fixed-capacity gate acquired around every driver subprocess. Capacity 0
/// disables the bound entirely.
#[derive(Debug)]
pub struct WorkerGate {
    semaphore: Option<Semaphore>,
}

impl WorkerGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: (capacity > 0).then(|| Semaphore::new(capacity)),
        }
    }

    /// Wait for a slot. The returned permit, if any, must be held for the
    /// duration of the driver invocation.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        match &self.semaphore {
            Some(semaphore) => semaphore.acquire().await.ok(),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn bounded_gate_blocks_past_capacity() {
        let gate = WorkerGate::new(1);
        let permit = gate.acquire().await;
        assert!(permit.is_some());

        let second = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(second.is_err(), "second acquire should block");

        drop(permit);
        let third = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn zero_capacity_means_unlimited() {
        let gate = WorkerGate::new(0);
        let a = gate.acquire().await;
        let b = gate.acquire().await;
        assert!(a.is_none() && b.is_none());
    }
}
