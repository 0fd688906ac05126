//! Camera slot to stream-slot mapping.
//!
//! Each camera position owns three consecutive stream slots:
//! 1..3 for slot 1, 4..6 for slot 2, and so on.

use std::collections::HashMap;

use thiserror::Error;

use super::device::Device;

/// Number of camera positions a workstation manages.
pub const MAX_DEVICES: u32 = 32;

/// The slot value was outside `1..=MAX_DEVICES`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid slot {slot}: must be within 1..={max}")]
pub struct SlotError {
    pub slot: u32,
    pub max: u32,
}

/// Device set failed the integrity checks required before opening.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceSetError {
    #[error(transparent)]
    InvalidSlot(#[from] SlotError),

    #[error("Corrupt device set: slot {slot} is claimed by devices {first} and {second}")]
    CorruptDeviceSet { slot: u32, first: u64, second: u64 },
}

/// Stream-slot numbers derived from one camera slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamSlots {
    pub live_main: u32,
    pub live_sub: u32,
    pub record: u32,
}

impl StreamSlots {
    /// All three slot numbers in (main, sub, record) order.
    pub fn all(&self) -> [u32; 3] {
        [self.live_main, self.live_sub, self.record]
    }
}

/// Map a 1-based camera slot to its stream slots.
pub fn stream_slots(slot: u32) -> Result<StreamSlots, SlotError> {
    if slot == 0 || slot > MAX_DEVICES {
        return Err(SlotError {
            slot,
            max: MAX_DEVICES,
        });
    }
    let base = (slot - 1) * 3;
    Ok(StreamSlots {
        live_main: base + 1,
        live_sub: base + 2,
        record: base + 3,
    })
}

/// Check that every device has a valid slot and no slot is claimed twice.
pub fn validate_device_set(devices: &[Device]) -> Result<(), DeviceSetError> {
    let mut seen: HashMap<u32, u64> = HashMap::with_capacity(devices.len());
    for device in devices {
        stream_slots(device.slot)?;
        if let Some(&first) = seen.get(&device.slot) {
            return Err(DeviceSetError::CorruptDeviceSet {
                slot: device.slot,
                first,
                second: device.id,
            });
        }
        seen.insert(device.slot, device.id);
    }
    Ok(())
}
