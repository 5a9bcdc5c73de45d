//! Shared sensor fcount mailbox.
//!
//! Some SoCs expose a small register window the companion firmware reads to
//! learn the latest frame count of each sensor. One [`SensorMailbox`] stands
//! for that window; channels joined to an ischain publish into their slot on
//! every accepted frame start.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::err::CamifError;

pub const SENSOR_POSITION_MAX: usize = 4;

#[derive(Debug, Default)]
pub struct SensorMailbox {
    ready: AtomicBool,
    slots: [AtomicU32; SENSOR_POSITION_MAX],
}

impl SensorMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every slot and start accepting publications.
    pub fn init(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
        self.ready.store(true, Ordering::Release);
    }

    pub fn teardown(&self) {
        self.ready.store(false, Ordering::Release);
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn slot(&self, position: usize) -> Result<&AtomicU32, CamifError> {
        if !self.is_ready() {
            return Err(CamifError::MailboxUnavailable);
        }
        self.slots
            .get(position)
            .ok_or(CamifError::MailboxUnavailable)
    }

    pub fn publish(&self, position: usize, fcount: u32) -> Result<(), CamifError> {
        self.slot(position)?.store(fcount, Ordering::Release);
        Ok(())
    }

    pub fn read(&self, position: usize) -> Result<u32, CamifError> {
        Ok(self.slot(position)?.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_requires_init() {
        let mailbox = SensorMailbox::new();
        assert_eq!(mailbox.publish(0, 1), Err(CamifError::MailboxUnavailable));
        mailbox.init();
        mailbox.publish(2, 42).unwrap();
        assert_eq!(mailbox.read(2), Ok(42));
        assert_eq!(mailbox.read(SENSOR_POSITION_MAX), Err(CamifError::MailboxUnavailable));
        mailbox.teardown();
        assert_eq!(mailbox.read(2), Err(CamifError::MailboxUnavailable));
    }
}
