//! Raw controller snapshot to canonical input state

use crate::input::{RAW_AXIS_MAX, RawButton, RawSnapshot};
use crate::protocol::{Buttons, InputState};

const BUTTON_TABLE: [(RawButton, Buttons); 15] = [
    (RawButton::South, Buttons::A),
    (RawButton::East, Buttons::B),
    (RawButton::West, Buttons::X),
    (RawButton::North, Buttons::Y),
    (RawButton::Start, Buttons::START),
    (RawButton::Back, Buttons::BACK),
    (RawButton::LeftStick, Buttons::LEFT_THUMB),
    (RawButton::RightStick, Buttons::RIGHT_THUMB),
    (RawButton::LeftShoulder, Buttons::LEFT_SHOULDER),
    (RawButton::RightShoulder, Buttons::RIGHT_SHOULDER),
    (RawButton::Guide, Buttons::GUIDE),
    (RawButton::DPadUp, Buttons::DPAD_UP),
    (RawButton::DPadDown, Buttons::DPAD_DOWN),
    (RawButton::DPadLeft, Buttons::DPAD_LEFT),
    (RawButton::DPadRight, Buttons::DPAD_RIGHT),
];

pub fn translate(raw: &RawSnapshot) -> InputState {
    let buttons = BUTTON_TABLE
        .iter()
        .filter(|(button, _)| raw.is_pressed(*button))
        .fold(Buttons::empty(), |acc, (_, bit)| acc | *bit);

    // The raw convention reports down as positive Y
    InputState {
        buttons,
        left_trigger: scale_trigger(raw.left_trigger),
        right_trigger: scale_trigger(raw.right_trigger),
        left_x: raw.left_x,
        left_y: raw.left_y.saturating_neg(),
        right_x: raw.right_x,
        right_y: raw.right_y.saturating_neg(),
    }
}

fn scale_trigger(raw: i16) -> u8 {
    let raw = i32::from(raw.max(0));
    (raw * 255 / i32::from(RAW_AXIS_MAX)) as u8
}
