use crate::input::*;
use anyhow::{Context, anyhow};
use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Replay, Ticks};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

const BUTTON_MAP: [(RawButton, Button); 15] = [
    (RawButton::South, Button::South),
    (RawButton::East, Button::East),
    (RawButton::West, Button::West),
    (RawButton::North, Button::North),
    (RawButton::Start, Button::Start),
    (RawButton::Back, Button::Select),
    (RawButton::LeftStick, Button::LeftThumb),
    (RawButton::RightStick, Button::RightThumb),
    (RawButton::LeftShoulder, Button::LeftTrigger),
    (RawButton::RightShoulder, Button::RightTrigger),
    (RawButton::Guide, Button::Mode),
    (RawButton::DPadUp, Button::DPadUp),
    (RawButton::DPadDown, Button::DPadDown),
    (RawButton::DPadLeft, Button::DPadLeft),
    (RawButton::DPadRight, Button::DPadRight),
];

struct RumbleRequest {
    id: ControllerId,
    left: u16,
    right: u16,
    duration: Duration,
}

/// Rumble handle for a gilrs gamepad
///
/// Requests are queued and played by the owning [`GilrsInput`] on its next poll,
/// since the gilrs context cannot leave the polling task.
#[derive(Clone)]
pub struct GilrsHaptics {
    id: ControllerId,
    tx: mpsc::UnboundedSender<RumbleRequest>,
}

impl Haptics for GilrsHaptics {
    fn rumble(&self, left: u16, right: u16, duration: Duration) -> Result<()> {
        self.tx
            .send(RumbleRequest {
                id: self.id,
                left,
                right,
                duration,
            })
            .map_err(|_| anyhow!("Input subsystem is gone"))
    }
}

/// Input subsystem backed by gilrs
pub struct GilrsInput {
    gilrs: Gilrs,
    ids: HashMap<ControllerId, GamepadId>,
    opened: HashSet<ControllerId>,
    pending: VecDeque<InputEvent>,
    dirty: bool,
    effects: HashMap<ControllerId, Effect>,
    rumble_tx: mpsc::UnboundedSender<RumbleRequest>,
    rumble_rx: mpsc::UnboundedReceiver<RumbleRequest>,
}

impl GilrsInput {
    pub fn new() -> Result<Self> {
        let gilrs = Gilrs::new().map_err(|e| anyhow!("Failed to initialize gilrs: {}", e))?;
        let (rumble_tx, rumble_rx) = mpsc::unbounded_channel();

        let mut ids = HashMap::new();
        let mut pending = VecDeque::new();
        // gilrs does not report pads that were connected before startup
        for (gamepad_id, gamepad) in gilrs.gamepads() {
            if !gamepad.is_connected() {
                continue;
            }
            let id = ControllerId(usize::from(gamepad_id));
            info!("Found gamepad {}: {}", id, gamepad.name());
            ids.insert(id, gamepad_id);
            pending.push_back(InputEvent::Attached(id));
        }

        Ok(Self {
            gilrs,
            ids,
            opened: HashSet::new(),
            pending,
            dirty: false,
            effects: HashMap::new(),
            rumble_tx,
            rumble_rx,
        })
    }

    fn gamepad(&self, id: ControllerId) -> Option<gilrs::Gamepad<'_>> {
        let gamepad_id = *self.ids.get(&id)?;
        self.gilrs.connected_gamepad(gamepad_id)
    }

    fn apply_rumble(&mut self) {
        while let Ok(request) = self.rumble_rx.try_recv() {
            if !self.opened.contains(&request.id) {
                trace!("Dropping rumble for released gamepad {}", request.id);
                continue;
            }
            if let Err(e) = self.play_rumble(&request) {
                debug!("Failed to rumble gamepad {}: {:#}", request.id, e);
            }
        }
    }

    fn play_rumble(&mut self, request: &RumbleRequest) -> Result<()> {
        let Some(gamepad_id) = self.ids.get(&request.id).copied() else {
            return Ok(());
        };
        if !self.gilrs.gamepad(gamepad_id).is_ff_supported() {
            return Ok(());
        }

        let millis = u32::try_from(request.duration.as_millis()).unwrap_or(u32::MAX);
        let scheduling = Replay {
            play_for: Ticks::from_ms(millis),
            ..Default::default()
        };
        let effect = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong {
                    magnitude: request.left,
                },
                scheduling,
                ..Default::default()
            })
            .add_effect(BaseEffect {
                kind: BaseEffectType::Weak {
                    magnitude: request.right,
                },
                scheduling,
                ..Default::default()
            })
            .gamepads(&[gamepad_id])
            .finish(&mut self.gilrs)
            .context("Failed to build rumble effect")?;
        effect.play().context("Failed to play rumble effect")?;

        // Replacing the previous effect drops (and stops) it
        self.effects.insert(request.id, effect);
        Ok(())
    }
}

impl InputSubsystem for GilrsInput {
    type Haptics = GilrsHaptics;

    fn poll_event(&mut self) -> Option<InputEvent> {
        self.apply_rumble();

        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        while let Some(Event {
            id: gamepad_id,
            event,
            ..
        }) = self.gilrs.next_event()
        {
            let id = ControllerId(usize::from(gamepad_id));
            match event {
                EventType::Connected => {
                    self.ids.insert(id, gamepad_id);
                    return Some(InputEvent::Attached(id));
                }
                EventType::Disconnected => {
                    self.effects.remove(&id);
                    return Some(InputEvent::Detached(id));
                }
                EventType::ButtonPressed(..)
                | EventType::ButtonReleased(..)
                | EventType::ButtonChanged(..)
                | EventType::AxisChanged(..) => self.dirty = true,
                _ => {}
            }
        }

        if std::mem::take(&mut self.dirty) {
            return Some(InputEvent::UpdateComplete);
        }
        None
    }

    fn open(&mut self, id: ControllerId) -> Result<PadInfo> {
        let gamepad = self
            .gamepad(id)
            .ok_or_else(|| anyhow!("Gamepad {} is not connected", id))?;
        let info = PadInfo {
            name: gamepad.name().to_string(),
            usb_ids: gamepad.vendor_id().zip(gamepad.product_id()),
        };
        self.opened.insert(id);
        Ok(info)
    }

    fn stable_identity(&self, id: ControllerId) -> Option<HardwareId> {
        let uuid = self.gamepad(id)?.uuid();
        (uuid != [0u8; 16]).then_some(HardwareId(uuid))
    }

    fn snapshot(&self, id: ControllerId) -> Option<RawSnapshot> {
        let gamepad = self.gamepad(id)?;
        let mut snapshot = RawSnapshot::default();
        for (raw, button) in BUTTON_MAP {
            snapshot.set_pressed(raw, gamepad.is_pressed(button));
        }

        let trigger = |button| {
            gamepad
                .button_data(button)
                .map(|data| to_raw(data.value()))
                .unwrap_or(0)
        };
        snapshot.left_trigger = trigger(Button::LeftTrigger2);
        snapshot.right_trigger = trigger(Button::RightTrigger2);

        // gilrs reports up as positive
        snapshot.left_x = to_raw(gamepad.value(Axis::LeftStickX));
        snapshot.left_y = to_raw(-gamepad.value(Axis::LeftStickY));
        snapshot.right_x = to_raw(gamepad.value(Axis::RightStickX));
        snapshot.right_y = to_raw(-gamepad.value(Axis::RightStickY));
        Some(snapshot)
    }

    fn haptics(&self, id: ControllerId) -> GilrsHaptics {
        GilrsHaptics {
            id,
            tx: self.rumble_tx.clone(),
        }
    }

    fn release(&mut self, id: ControllerId) {
        if self.opened.remove(&id) {
            debug!("Released gamepad {}", id);
        }
        self.effects.remove(&id);
    }
}

/// Convert a normalized gilrs value to the raw 16-bit range
fn to_raw(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * f32::from(RAW_AXIS_MAX)).round() as i16
}
