//! Hardware abstraction over the physical controller input subsystem

use anyhow::Result;
use std::fmt;
use std::time::Duration;

mod gilrs_backend;

pub use gilrs_backend::{GilrsHaptics, GilrsInput};

/// Platform-assigned handle of one physical attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub usize);

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable hardware identity of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareId(pub [u8; 16]);

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Raw logical buttons as reported by the input subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawButton {
    South,
    East,
    West,
    North,
    Start,
    Back,
    LeftStick,
    RightStick,
    LeftShoulder,
    RightShoulder,
    Guide,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

impl RawButton {
    pub const ALL: [RawButton; 15] = [
        RawButton::South,
        RawButton::East,
        RawButton::West,
        RawButton::North,
        RawButton::Start,
        RawButton::Back,
        RawButton::LeftStick,
        RawButton::RightStick,
        RawButton::LeftShoulder,
        RawButton::RightShoulder,
        RawButton::Guide,
        RawButton::DPadUp,
        RawButton::DPadDown,
        RawButton::DPadLeft,
        RawButton::DPadRight,
    ];
}

/// Largest raw axis value; triggers are rescaled against it
pub const RAW_AXIS_MAX: i16 = i16::MAX;

/// One polled controller state in the raw convention
///
/// Stick Y axes are positive when pushed down, triggers rest at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSnapshot {
    pressed: [bool; RawButton::ALL.len()],
    pub left_trigger: i16,
    pub right_trigger: i16,
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
}

impl RawSnapshot {
    pub fn is_pressed(&self, button: RawButton) -> bool {
        self.pressed[button as usize]
    }

    pub fn set_pressed(&mut self, button: RawButton, pressed: bool) {
        self.pressed[button as usize] = pressed;
    }

    pub fn with_pressed(mut self, button: RawButton) -> Self {
        self.set_pressed(button, true);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Attached(ControllerId),
    Detached(ControllerId),
    /// All pending input changes have been applied to the controller states
    UpdateComplete,
    Quit,
}

/// Details of an opened controller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PadInfo {
    pub name: String,
    pub usb_ids: Option<(u16, u16)>,
}

/// Haptic actuator of one physical controller
///
/// Handles are moved into feedback tasks, so they must be `Send`.
pub trait Haptics: Send + 'static {
    fn rumble(&self, left: u16, right: u16, duration: Duration) -> Result<()>;
}

/// Source of controller attach/detach/update events and per-controller queries
pub trait InputSubsystem {
    type Haptics: Haptics;

    /// Next pending event, without blocking
    fn poll_event(&mut self) -> Option<InputEvent>;

    /// Open the physical handle of an attached controller
    fn open(&mut self, id: ControllerId) -> Result<PadInfo>;

    /// Stable hardware identity, if the controller has one
    fn stable_identity(&self, id: ControllerId) -> Option<HardwareId>;

    fn snapshot(&self, id: ControllerId) -> Option<RawSnapshot>;

    fn haptics(&self, id: ControllerId) -> Self::Haptics;

    /// Release the physical handle; releasing a closed handle is a no-op
    fn release(&mut self, id: ControllerId);
}
