use anyhow::{bail, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Cap on concurrently mounted heavy renderers (maps, charts, diagrams).
/// The widget-mounting collaborator acquires a slot before mounting and
/// releases it by dropping the slot. Waiters queue up to a bound; beyond
/// that, acquisition fails fast instead of piling up.
#[derive(Clone)]
pub struct WidgetPool {
    permits: Arc<Semaphore>,
    waiters: Arc<AtomicUsize>,
    max_waiters: usize,
}

#[derive(Debug)]
pub struct WidgetSlot {
    _permit: OwnedSemaphorePermit,
}

struct WaiterGuard<'a>(&'a AtomicUsize);

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WidgetPool {
    pub fn new(capacity: usize, max_waiters: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
            waiters: Arc::new(AtomicUsize::new(0)),
            max_waiters,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn try_acquire(&self) -> Option<WidgetSlot> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| WidgetSlot { _permit: permit })
    }

    /// Wait for a slot, but only while the waiter queue has room.
    pub async fn acquire(&self) -> Result<WidgetSlot> {
        if let Some(slot) = self.try_acquire() {
            return Ok(slot);
        }

        let seated = self.waiters.fetch_add(1, Ordering::SeqCst);
        if seated >= self.max_waiters {
            self.waiters.fetch_sub(1, Ordering::SeqCst);
            bail!(
                "widget pool waiter queue is full ({} waiting)",
                self.max_waiters
            );
        }
        let _guard = WaiterGuard(&self.waiters);

        let permit = self.permits.clone().acquire_owned().await?;
        Ok(WidgetSlot { _permit: permit })
    }
}
