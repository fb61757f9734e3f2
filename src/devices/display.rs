use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

use super::{Device, DeviceError};
use crate::word::Word;

/// Display status register: bit 15 = ready to accept a new character.
pub const DSR_ADDR: u16 = 0xFE04;
/// Display data register: low 8 bits are emitted on write.
pub const DDR_ADDR: u16 = 0xFE06;

const DSR_READY: u16 = 0x8000;

/// How many characters the overflow channel holds before a blocking
/// listener starts losing output, per spec §5's "bounded buffer and drops
/// on overflow" clause.
const OVERFLOW_CAPACITY: usize = 4096;

/// Memory-mapped display. Writing DDR emits the low 8 bits to an optional
/// listener callback, invoked synchronously from the CPU thread, and always
/// pushes the byte onto a bounded channel a caller can drain from any
/// thread without blocking the CPU.
pub struct Display {
    listener: Option<Box<dyn FnMut(u8) + Send>>,
    overflow: SyncSender<u8>,
    overflow_rx: Option<Receiver<u8>>,
}

impl Display {
    pub fn new() -> Self {
        let (tx, rx) = sync_channel(OVERFLOW_CAPACITY);
        Self {
            listener: None,
            overflow: tx,
            overflow_rx: Some(rx),
        }
    }

    /// Register a callback invoked with every byte written to DDR.
    pub fn set_listener(&mut self, listener: Box<dyn FnMut(u8) + Send>) {
        self.listener = Some(listener);
    }

    /// Take the receiving end of the overflow buffer, for a caller that
    /// wants to drain output without installing a listener callback. Can
    /// only be taken once.
    pub fn take_receiver(&mut self) -> Option<Receiver<u8>> {
        self.overflow_rx.take()
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Display {
    fn addresses(&self) -> &[u16] {
        &[DSR_ADDR, DDR_ADDR]
    }

    fn read(&mut self, addr: u16) -> Result<Word, DeviceError> {
        match addr {
            DSR_ADDR => Ok(Word::new(DSR_READY)), // always ready in this emulator
            DDR_ADDR => Ok(Word::new(0)),
            _ => Err(DeviceError::Unmapped { addr }),
        }
    }

    fn write(&mut self, addr: u16, value: Word) -> Result<(), DeviceError> {
        match addr {
            DSR_ADDR => Ok(()), // status is derived, not stored
            DDR_ADDR => {
                let byte = (value.get() & 0xFF) as u8;
                if let Some(listener) = self.listener.as_mut() {
                    listener(byte);
                }
                if let Err(TrySendError::Full(_)) = self.overflow.try_send(byte) {
                    tracing::warn!("display overflow buffer full, dropping byte 0x{byte:02X}");
                }
                Ok(())
            }
            _ => Err(DeviceError::Unmapped { addr }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn dsr_is_always_ready() {
        let mut d = Display::new();
        assert_eq!(d.read(DSR_ADDR).unwrap().get(), DSR_READY);
    }

    #[test]
    fn writing_ddr_invokes_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cl = seen.clone();
        let mut d = Display::new();
        d.set_listener(Box::new(move |b| seen_cl.lock().unwrap().push(b)));
        d.write(DDR_ADDR, Word::new(b'A' as u16)).unwrap();
        d.write(DDR_ADDR, Word::new(b'B' as u16)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![b'A', b'B']);
    }

    #[test]
    fn writing_ddr_is_drainable_via_overflow_channel() {
        let mut d = Display::new();
        let rx = d.take_receiver().unwrap();
        d.write(DDR_ADDR, Word::new(b'H' as u16)).unwrap();
        d.write(DDR_ADDR, Word::new(b'i' as u16)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), b'H');
        assert_eq!(rx.try_recv().unwrap(), b'i');
    }
}
