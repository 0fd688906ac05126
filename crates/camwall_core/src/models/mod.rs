//! Data models for camwall.
//!
//! This module contains the core data structures shared by every layer:
//! - Enums for storage flavor, recording mode, resolution classes
//! - Device rows (RTSP, USB, empty sentinel)
//! - Slot identity (camera slot to stream slots)

mod device;
mod enums;
mod slots;

pub use device::{Device, DeviceKind, RtspCamera, UsbCamera};
pub use enums::{CaptureKind, RecordingMode, ResolutionClass, StorageFlavor};
pub use slots::{
    stream_slots, validate_device_set, DeviceSetError, SlotError, StreamSlots, MAX_DEVICES,
};
