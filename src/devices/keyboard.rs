use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Device, DeviceError};
use crate::interrupts::InterruptHandle;
use crate::word::Word;

/// Keyboard status register: bit 15 = ready, bit 14 = interrupt-enable.
pub const KBSR_ADDR: u16 = 0xFE00;
/// Keyboard data register: low 8 bits are the last byte read from outside.
pub const KBDR_ADDR: u16 = 0xFE02;

const KBSR_READY: u16 = 0x8000;
const KBSR_IE: u16 = 0x4000;

/// Keyboard interrupt priority and vector per spec §4.5.
const KEYBOARD_PRIORITY: u8 = 4;
const KEYBOARD_VECTOR: u8 = 0x80;

/// Memory-mapped keyboard. `update(byte)` is callable from any thread (the
/// out-of-scope console adapter's input-reading thread); an internal mutex
/// serializes it against the CPU thread's memory-mapped reads, per spec §5.
pub struct Keyboard {
    queue: Mutex<VecDeque<u8>>,
    interrupts: InterruptHandle,
}

impl Keyboard {
    pub fn new(interrupts: InterruptHandle) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            interrupts,
        }
    }

    /// Called by an external producer when a byte arrives. Stores the byte,
    /// sets KBSR.ready, and raises an interrupt if KBSR.ie is set.
    ///
    /// Bytes queue up if the CPU hasn't consumed the previous one yet; KBSR
    /// only reflects "ready" for the byte at the front of the queue.
    pub fn update(&self, byte: u8) {
        let mut queue = self.queue.lock().expect("keyboard queue poisoned");
        queue.push_back(byte);
    }

    fn ready(&self) -> bool {
        !self.queue.lock().expect("keyboard queue poisoned").is_empty()
    }
}

impl Device for Keyboard {
    fn addresses(&self) -> &[u16] {
        &[KBSR_ADDR, KBDR_ADDR]
    }

    fn read(&mut self, addr: u16) -> Result<Word, DeviceError> {
        match addr {
            KBSR_ADDR => {
                let status = if self.ready() { KBSR_READY } else { 0 };
                Ok(Word::new(status))
            }
            KBDR_ADDR => {
                let mut queue = self.queue.lock().expect("keyboard queue poisoned");
                let byte = queue.pop_front().unwrap_or(0);
                Ok(Word::new(byte as u16))
            }
            _ => Err(DeviceError::Unmapped { addr }),
        }
    }

    fn write(&mut self, addr: u16, value: Word) -> Result<(), DeviceError> {
        match addr {
            KBSR_ADDR => {
                if value.get() & KBSR_IE != 0 && self.ready() {
                    self.interrupts.raise(KEYBOARD_PRIORITY, KEYBOARD_VECTOR);
                }
                Ok(())
            }
            KBDR_ADDR => Ok(()), // KBDR is read-only; writes are ignored.
            _ => Err(DeviceError::Unmapped { addr }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::InterruptController;
    use std::sync::Arc;

    fn handle() -> (Arc<InterruptController>, InterruptHandle) {
        let controller = Arc::new(InterruptController::new());
        let handle = InterruptHandle::new(controller.clone(), 1);
        (controller, handle)
    }

    #[test]
    fn update_then_read_kbsr_reports_ready() {
        let (_controller, handle) = handle();
        let mut kb = Keyboard::new(handle);
        assert_eq!(kb.read(KBSR_ADDR).unwrap().get() & KBSR_READY, 0);
        kb.update(b'A');
        assert_eq!(kb.read(KBSR_ADDR).unwrap().get() & KBSR_READY, KBSR_READY);
    }

    #[test]
    fn reading_kbdr_clears_ready_when_queue_drains() {
        let (_controller, handle) = handle();
        let mut kb = Keyboard::new(handle);
        kb.update(b'A');
        assert_eq!(kb.read(KBDR_ADDR).unwrap().get(), b'A' as u16);
        assert_eq!(kb.read(KBSR_ADDR).unwrap().get() & KBSR_READY, 0);
    }

    #[test]
    fn interrupt_enable_raises_when_ready() {
        let (controller, handle) = handle();
        let mut kb = Keyboard::new(handle);
        kb.update(b'A');
        kb.write(KBSR_ADDR, Word::new(KBSR_IE)).unwrap();
        let pending = controller.poll().unwrap();
        assert_eq!(pending.priority, KEYBOARD_PRIORITY);
        assert_eq!(pending.vector, KEYBOARD_VECTOR);
    }
}
