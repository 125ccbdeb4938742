// ai
//! 🚦 Admission — the velvet rope in front of the fetch/upload club.
//!
//! Capacity N, one slot per admitted job. A slot is an RAII guard: when the job's scope ends,
//! however it ends, the slot goes back. No "remember to release" code path exists to forget.
//!
//! 🧠 Knowledge graph:
//! - `AdmissionController`: a `tokio::sync::Semaphore` with N permits, plus in-flight/peak gauges.
//! - `AdmissionSlot`: owned permit + gauge bookkeeping. `Drop` is the release.
//! - Cancellation wins ties: once the run is cancelled nobody new gets through the rope. 🦆

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// 🚦 Counting gate with capacity N.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    gauges: Arc<Gauges>,
}

#[derive(Debug, Default)]
struct Gauges {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// 🎟️ Proof of admission. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
    gauges: Arc<Gauges>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.gauges.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            gauges: Arc::new(Gauges::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 🎟️ Waits for a slot. `Ok(None)` means the run was cancelled before one came free.
    ///
    /// An `Err` means the gate itself is broken (semaphore closed). That one takes the run down.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Option<AdmissionSlot>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            permit = self.semaphore.clone().acquire_owned() => permit
                .context("💀 The admission gate closed mid-run. Nobody closes this gate. And yet.")?,
        };

        let now_in_flight = self.gauges.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.gauges.peak.fetch_max(now_in_flight, Ordering::AcqRel);
        Ok(Some(AdmissionSlot {
            _permit: permit,
            gauges: self.gauges.clone(),
        }))
    }

    /// 📈 Jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.gauges.in_flight.load(Ordering::Acquire)
    }

    /// 🏔️ The most slots ever held at once during this run.
    pub fn peak_in_flight(&self) -> usize {
        self.gauges.peak.load(Ordering::Acquire)
    }
}
