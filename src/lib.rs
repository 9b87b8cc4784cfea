//! Padbridge - physical controller to VIIPER bridge
//!
//! This library forwards local game controllers to emulated devices on a
//! remote USB-IP bus service, and plays rumble sent back by the service on
//! the physical pads.

pub mod client;
pub mod config;
pub mod event_loop;
pub mod feedback;
pub mod input;
pub mod protocol;
pub mod registry;
pub mod translate;

// Re-export commonly used types
pub use client::{Bus, BusApi, BusClient, DeviceStream, StreamWriter};
pub use config::Config;
pub use event_loop::{EventLoop, ExitReason, QuitSignal};
pub use input::{
    ControllerId, GilrsInput, Haptics, HardwareId, InputEvent, InputSubsystem, PadInfo, RawButton,
    RawSnapshot,
};
pub use protocol::{
    BusId, Buttons, DeviceProfile, FeedbackFrame, InputState, ProtocolError, RemoteDevice,
};
pub use registry::{Registry, Session, SessionPhase};
pub use translate::translate;
