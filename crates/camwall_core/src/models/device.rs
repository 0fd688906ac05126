//! Camera device records.

use serde::{Deserialize, Serialize};

use super::enums::CaptureKind;
use super::slots::{stream_slots, SlotError, StreamSlots};

/// One row of the device collection.
///
/// Every camera slot has exactly one record; unused slots hold
/// [`DeviceKind::Empty`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Persistent row identity.
    #[serde(rename = "_id")]
    pub id: u64,
    /// 1-based camera position.
    pub slot: u32,
    /// Kind-specific fields.
    #[serde(flatten)]
    pub kind: DeviceKind,
}

/// What occupies a camera slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeviceKind {
    Rtsp(RtspCamera),
    Usb(UsbCamera),
    Empty,
}

/// Network camera reached over RTSP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtspCamera {
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub tail: String,
    #[serde(default)]
    pub subaddress_main: String,
    #[serde(default = "default_true")]
    pub live_main: bool,
    #[serde(default)]
    pub rec_main: bool,
    #[serde(default)]
    pub subaddress_sub: String,
    #[serde(default)]
    pub live_sub: bool,
    #[serde(default)]
    pub rec_sub: bool,
}

fn default_true() -> bool {
    true
}

impl RtspCamera {
    /// Camera with only an address and credentials; main stream live.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: password.into(),
            port: String::new(),
            tail: String::new(),
            subaddress_main: String::new(),
            live_main: true,
            rec_main: false,
            subaddress_sub: String::new(),
            live_sub: false,
            rec_sub: false,
        }
    }

    fn base_url(&self) -> String {
        let mut url = format!(
            "rtsp://{}:{}@{}",
            self.username, self.password, self.address
        );
        let port = self.port.trim();
        if !port.is_empty() {
            url.push(':');
            url.push_str(port);
        }
        if !self.tail.is_empty() {
            url.push('/');
            url.push_str(&self.tail);
        }
        url
    }

    /// Full URL of the main stream.
    pub fn main_url(&self) -> String {
        let mut url = self.base_url();
        if !self.subaddress_main.is_empty() {
            url.push('/');
            url.push_str(&self.subaddress_main);
        }
        url
    }

    /// Full URL of the sub stream.
    pub fn sub_url(&self) -> String {
        let mut url = self.base_url();
        if !self.subaddress_sub.is_empty() {
            url.push('/');
            url.push_str(&self.subaddress_sub);
        }
        url
    }
}

/// Local H264 camera on a V4L2 device node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbCamera {
    pub address: String,
}

impl Device {
    /// Empty sentinel row for a slot.
    pub fn empty(id: u64, slot: u32) -> Self {
        Self {
            id,
            slot,
            kind: DeviceKind::Empty,
        }
    }

    /// RTSP camera row.
    pub fn rtsp(id: u64, slot: u32, camera: RtspCamera) -> Self {
        Self {
            id,
            slot,
            kind: DeviceKind::Rtsp(camera),
        }
    }

    /// USB camera row.
    pub fn usb(id: u64, slot: u32, address: impl Into<String>) -> Self {
        Self {
            id,
            slot,
            kind: DeviceKind::Usb(UsbCamera {
                address: address.into(),
            }),
        }
    }

    /// Whether the slot holds a real camera.
    pub fn is_active(&self) -> bool {
        !matches!(self.kind, DeviceKind::Empty)
    }

    /// Stream slots used by this device.
    pub fn stream_slots(&self) -> Result<StreamSlots, SlotError> {
        stream_slots(self.slot)
    }

    /// Capture thread that feeds this device, if any.
    pub fn capture_kind(&self) -> Option<CaptureKind> {
        match self.kind {
            DeviceKind::Rtsp(_) => Some(CaptureKind::Live),
            DeviceKind::Usb(_) => Some(CaptureKind::Usb),
            DeviceKind::Empty => None,
        }
    }

    /// Address of the main stream.
    pub fn main_address(&self) -> Option<String> {
        match &self.kind {
            DeviceKind::Rtsp(cam) => Some(cam.main_url()),
            DeviceKind::Usb(cam) => Some(cam.address.clone()),
            DeviceKind::Empty => None,
        }
    }

    /// Address of the sub stream, when the device has one enabled.
    pub fn sub_address(&self) -> Option<String> {
        match &self.kind {
            DeviceKind::Rtsp(cam) if cam.live_sub => Some(cam.sub_url()),
            _ => None,
        }
    }

    /// Address whose stream feeds the record slot.
    pub fn record_address(&self) -> Option<String> {
        match &self.kind {
            DeviceKind::Rtsp(cam) if cam.rec_sub && cam.live_sub => Some(cam.sub_url()),
            _ => self.main_address(),
        }
    }

    /// Short label for camera lists.
    pub fn label(&self) -> String {
        match &self.kind {
            DeviceKind::Rtsp(cam) => {
                let mut st = format!("{} RTSP (rtsp://{}", self.slot, cam.address);
                if !cam.tail.is_empty() {
                    st.push('/');
                    st.push_str(&cam.tail);
                }
                st.push(')');
                st
            }
            DeviceKind::Usb(cam) => format!("{} USB ({})", self.slot, cam.address),
            DeviceKind::Empty => format!("{} <Empty>", self.slot),
        }
    }
}
