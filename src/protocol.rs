use bitflags::bitflags;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of a bus on the bridging service
pub type BusId = u32;

bitflags! {
    /// Button bitmask of the canonical input state (XInput bit layout)
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u32 {
        const DPAD_UP        = 0x0001;
        const DPAD_DOWN      = 0x0002;
        const DPAD_LEFT      = 0x0004;
        const DPAD_RIGHT     = 0x0008;
        const START          = 0x0010;
        const BACK           = 0x0020;
        const LEFT_THUMB     = 0x0040;
        const RIGHT_THUMB    = 0x0080;
        const LEFT_SHOULDER  = 0x0100;
        const RIGHT_SHOULDER = 0x0200;
        const GUIDE          = 0x0400;
        const A              = 0x1000;
        const B              = 0x2000;
        const X              = 0x4000;
        const Y              = 0x8000;
    }
}

/// Canonical input state written to an emulated device
///
/// Stick axes follow the "positive Y is up" convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputState {
    pub buttons: Buttons,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
}

impl InputState {
    /// Encoded size on the device stream
    pub const SIZE: usize = 14;

    /// Encode as little-endian bytes in field order
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.buttons.bits().to_le_bytes());
        out[4] = self.left_trigger;
        out[5] = self.right_trigger;
        out[6..8].copy_from_slice(&self.left_x.to_le_bytes());
        out[8..10].copy_from_slice(&self.left_y.to_le_bytes());
        out[10..12].copy_from_slice(&self.right_x.to_le_bytes());
        out[12..14].copy_from_slice(&self.right_y.to_le_bytes());
        out
    }
}

/// Rumble command sent by the bridging service for an emulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackFrame {
    pub left_motor: u8,
    pub right_motor: u8,
}

impl FeedbackFrame {
    pub const SIZE: usize = 2;

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        match buf {
            [left_motor, right_motor] => Ok(Self {
                left_motor: *left_motor,
                right_motor: *right_motor,
            }),
            _ => Err(ProtocolError::FrameLength {
                expected: Self::SIZE,
                actual: buf.len(),
            }),
        }
    }

    /// Motor duties rescaled to the 16-bit range (`magnitude * 257`)
    pub fn duties(&self) -> (u16, u16) {
        (duty(self.left_motor), duty(self.right_motor))
    }
}

/// Rescale an 8-bit motor magnitude to a 16-bit duty value
pub fn duty(magnitude: u8) -> u16 {
    u16::from(magnitude) * 257
}

/// Kind of emulated device requested from the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    #[default]
    Xbox360,
}

impl DeviceProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceProfile::Xbox360 => "xbox360",
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emulated device as reported by the bridging service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDevice {
    pub bus_id: BusId,
    pub dev_id: String,
    #[serde(default)]
    pub vid: String,
    #[serde(default)]
    pub pid: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
}

impl RemoteDevice {
    /// USB vendor/product pair, if the service reported parseable ids
    pub fn usb_ids(&self) -> Option<(u16, u16)> {
        Some((parse_hex_id(&self.vid)?, parse_hex_id(&self.pid)?))
    }
}

fn parse_hex_id(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u16::from_str_radix(digits, 16).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusList {
    pub buses: Vec<BusId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusCreated {
    pub bus_id: BusId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceCreateRequest<'a> {
    #[serde(rename = "type")]
    device_type: &'a str,
}

/// Problem document returned by the service on failure
#[derive(Debug, Clone, Deserialize)]
struct Problem {
    status: u16,
    title: String,
    #[serde(default)]
    detail: String,
}

/// Requests understood by the bridging service API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    Ping,
    ListBuses,
    CreateBus { device_count: u32 },
    RemoveBus { bus_id: BusId },
    AddDevice { bus_id: BusId, profile: DeviceProfile },
    RemoveDevice { bus_id: BusId, dev_id: String },
    OpenStream { bus_id: BusId, dev_id: String },
}

impl ApiRequest {
    pub fn path(&self) -> String {
        match self {
            ApiRequest::Ping => "ping".to_string(),
            ApiRequest::ListBuses => "bus/list".to_string(),
            ApiRequest::CreateBus { .. } => "bus/create".to_string(),
            ApiRequest::RemoveBus { .. } => "bus/remove".to_string(),
            ApiRequest::AddDevice { bus_id, .. } => format!("bus/{}/add", bus_id),
            ApiRequest::RemoveDevice { bus_id, .. } => format!("bus/{}/remove", bus_id),
            ApiRequest::OpenStream { bus_id, dev_id } => format!("bus/{}/{}", bus_id, dev_id),
        }
    }

    fn payload(&self) -> Result<Option<String>, ProtocolError> {
        Ok(match self {
            ApiRequest::CreateBus { device_count } => Some(device_count.to_string()),
            ApiRequest::RemoveBus { bus_id } => Some(bus_id.to_string()),
            ApiRequest::AddDevice { profile, .. } => Some(serde_json::to_string(
                &DeviceCreateRequest {
                    device_type: profile.as_str(),
                },
            )?),
            ApiRequest::RemoveDevice { dev_id, .. } => Some(dev_id.clone()),
            ApiRequest::Ping | ApiRequest::ListBuses | ApiRequest::OpenStream { .. } => None,
        })
    }

    /// Encode as `<path>[ <payload>]\0`
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut line = self.path();
        if let Some(payload) = self.payload()? {
            line.push(' ');
            line.push_str(&payload);
        }
        let mut bytes = line.into_bytes();
        bytes.push(0);
        Ok(bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("{title} ({status}): {detail}")]
    Api {
        status: u16,
        title: String,
        detail: String,
    },

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Bad frame length: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },
}

impl ProtocolError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProtocolError::Api { status: 404, .. })
    }
}

/// Parse a raw API response, turning problem documents into errors
pub fn parse_response<T: DeserializeOwned>(raw: &[u8]) -> Result<T, ProtocolError> {
    let end = raw
        .iter()
        .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let raw = &raw[..end];
    if raw.is_empty() {
        return Err(ProtocolError::EmptyResponse);
    }

    let value: serde_json::Value = serde_json::from_slice(raw)?;
    let is_problem = value.get("title").is_some()
        && value
            .get("status")
            .and_then(serde_json::Value::as_u64)
            .is_some_and(|status| status >= 400);
    if is_problem {
        let problem: Problem = serde_json::from_value(value)?;
        return Err(ProtocolError::Api {
            status: problem.status,
            title: problem.title,
            detail: problem.detail,
        });
    }

    Ok(serde_json::from_value(value)?)
}
