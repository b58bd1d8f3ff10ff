//! Identifier allocation for the single outstanding request.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Request {0} is still outstanding")]
pub struct SlotBusy(pub u8);

/// Hands out RADIUS identifiers for one request at a time.
///
/// Identifiers rotate through 0..=255. A new identifier can only be taken once the
/// previous request has reached a terminal outcome and released the slot.
#[derive(Debug)]
pub struct RequestSlot {
    next_id: u8,
    in_use: Option<u8>,
}

impl RequestSlot {
    pub fn new(first_id: u8) -> RequestSlot {
        RequestSlot {
            next_id: first_id,
            in_use: None,
        }
    }

    /// Takes the next identifier and marks the slot busy.
    pub fn acquire(&mut self) -> Result<u8, SlotBusy> {
        if let Some(id) = self.in_use {
            return Err(SlotBusy(id));
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.in_use = Some(id);
        Ok(id)
    }

    pub fn release(&mut self) {
        self.in_use = None;
    }
}
