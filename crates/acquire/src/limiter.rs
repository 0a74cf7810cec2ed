//! Concurrency gate for in-flight acquisitions.
//!
//! Cloning a repository is network- and disk-heavy; the service bounds how
//! many run at once. Callers block until a slot frees up; work is never
//! dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

/// Counting gate with a fixed number of slots.
#[derive(Debug)]
pub struct AcquireGate {
    slots: Mutex<usize>,
    freed: Condvar,
    total_waited: AtomicU64,
}

impl AcquireGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            slots: Mutex::new(max_concurrent.max(1)),
            freed: Condvar::new(),
            total_waited: AtomicU64::new(0),
        }
    }

    /// Block until a slot is free and claim it. The returned guard releases
    /// the slot on drop.
    pub fn enter(&self) -> GateGuard<'_> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        if *slots == 0 {
            self.total_waited.fetch_add(1, Ordering::Relaxed);
        }
        while *slots == 0 {
            slots = self
                .freed
                .wait(slots)
                .unwrap_or_else(|p| p.into_inner());
        }
        *slots -= 1;
        GateGuard { gate: self }
    }

    /// How many entries had to wait for a slot.
    pub fn total_waited(&self) -> u64 {
        self.total_waited.load(Ordering::Relaxed)
    }

    fn release(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        *slots += 1;
        self.freed.notify_one();
    }
}

/// RAII slot; releasing happens on drop.
pub struct GateGuard<'a> {
    gate: &'a AcquireGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
