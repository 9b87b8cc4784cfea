use crate::client::{Bus, BusApi};
use crate::feedback::StreamFailure;
use crate::input::{ControllerId, InputSubsystem, PadInfo};
use crate::protocol::DeviceProfile;
use crate::translate::translate;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

mod session;

pub use session::Session;

/// Registration lifecycle of one controller identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unregistered,
    Registering,
    Active,
    Closing,
    Removed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Unregistered => "unregistered",
            SessionPhase::Registering => "registering",
            SessionPhase::Active => "active",
            SessionPhase::Closing => "closing",
            SessionPhase::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Every physical controller is bridged as this emulated device
const PROFILE: DeviceProfile = DeviceProfile::Xbox360;

fn transition(id: ControllerId, phase: SessionPhase) {
    trace!(controller = %id, %phase, "Session phase");
}

/// Maps attached controllers to their bridged sessions
///
/// Owned and driven by the event loop; nothing here is shared across tasks
/// except the stream-failure channel fed by feedback listeners.
pub struct Registry<B: BusApi> {
    api: B,
    bus: Bus,
    shutdown: CancellationToken,
    sessions: HashMap<ControllerId, Session<B::Writer>>,
    unmanaged: HashSet<ControllerId>,
    next_serial: u64,
    failures_tx: mpsc::UnboundedSender<StreamFailure>,
    failures_rx: mpsc::UnboundedReceiver<StreamFailure>,
}

impl<B: BusApi> Registry<B> {
    pub fn new(api: B, bus: Bus, shutdown: CancellationToken) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            api,
            bus,
            shutdown,
            sessions: HashMap::new(),
            unmanaged: HashSet::new(),
            next_serial: 0,
            failures_tx,
            failures_rx,
        }
    }

    pub fn bus(&self) -> Bus {
        self.bus
    }

    pub fn phase(&self, id: ControllerId) -> Option<SessionPhase> {
        if self.sessions.contains_key(&id) {
            Some(SessionPhase::Active)
        } else if self.unmanaged.contains(&id) {
            Some(SessionPhase::Unregistered)
        } else {
            None
        }
    }

    pub fn session(&self, id: ControllerId) -> Option<&Session<B::Writer>> {
        self.sessions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Handle a newly attached controller
    pub async fn attach<I: InputSubsystem>(&mut self, input: &mut I, id: ControllerId) {
        if self.sessions.contains_key(&id) || self.unmanaged.contains(&id) {
            debug!("Controller {} already known", id);
            return;
        }

        let info = match input.open(id) {
            Ok(info) => info,
            Err(e) => {
                warn!("Failed to open controller {}: {:#}", id, e);
                return;
            }
        };
        debug!("Controller {} attached: {:?}", id, info);

        let Some(identity) = input.stable_identity(id) else {
            debug!("Skipping controller {} ({}): no stable identity", id, info.name);
            self.leave_unmanaged(input, id);
            return;
        };
        if self.is_echo(&info) {
            info!("Ignoring controller {} ({}): emulated by this bridge", id, info.name);
            self.leave_unmanaged(input, id);
            return;
        }

        transition(id, SessionPhase::Registering);
        let (stream, device) = match self.api.add_device(self.bus.id, PROFILE).await {
            Ok(added) => added,
            Err(e) => {
                error!("Failed to add {} device for {}: {:#}", PROFILE, id, e);
                self.leave_unmanaged(input, id);
                return;
            }
        };

        self.next_serial += 1;
        let session = Session::start(
            id,
            self.next_serial,
            stream,
            device,
            input.haptics(id),
            self.shutdown.child_token(),
            self.failures_tx.clone(),
        );
        info!(
            "Bridging {} ({}, {}) to device {} on bus {}",
            id,
            info.name,
            identity,
            session.device().dev_id,
            self.bus.id
        );
        self.sessions.insert(id, session);
        transition(id, SessionPhase::Active);
    }

    /// Handle a detached controller
    pub async fn detach<I: InputSubsystem>(&mut self, input: &mut I, id: ControllerId) {
        if self.unmanaged.remove(&id) {
            debug!("Unmanaged controller {} detached", id);
            return;
        }
        if self.sessions.contains_key(&id) {
            self.teardown(input, id).await;
        }
    }

    /// Translate and write the current state of every active controller
    pub async fn update_all<I: InputSubsystem>(&mut self, input: &mut I) {
        let mut failed = Vec::new();
        for (id, session) in self.sessions.iter_mut() {
            let Some(raw) = input.snapshot(*id) else {
                continue;
            };
            if let Err(e) = session.push(translate(&raw)).await {
                warn!("Failed to write state for {}: {}", id, e);
                failed.push(*id);
            }
        }

        for id in failed {
            self.teardown(input, id).await;
        }
    }

    /// Tear down sessions whose feedback stream failed
    pub async fn reap<I: InputSubsystem>(&mut self, input: &mut I) {
        while let Ok(failure) = self.failures_rx.try_recv() {
            let current = self
                .sessions
                .get(&failure.controller)
                .map(Session::serial);
            if current != Some(failure.serial) {
                trace!("Ignoring stale stream failure for {}", failure.controller);
                continue;
            }
            warn!("Device stream for {} failed", failure.controller);
            self.teardown(input, failure.controller).await;
        }
    }

    /// Close every session and release the bus
    pub async fn shutdown<I: InputSubsystem>(mut self, input: &mut I) {
        let ids: Vec<ControllerId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.teardown(input, id).await;
        }
        for id in self.unmanaged.drain() {
            trace!("Forgetting unmanaged controller {}", id);
        }
        self.bus.release(&self.api).await;
    }

    async fn teardown<I: InputSubsystem>(&mut self, input: &mut I, id: ControllerId) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        transition(id, SessionPhase::Closing);

        let device = session.close().await;
        if let Err(e) = self.api.remove_device(&device).await {
            debug!("Failed to remove device {}: {:#}", device.dev_id, e);
        }
        input.release(id);

        transition(id, SessionPhase::Removed);
        info!("Stopped bridging {} (device {})", id, device.dev_id);
    }

    fn leave_unmanaged<I: InputSubsystem>(&mut self, input: &mut I, id: ControllerId) {
        input.release(id);
        self.unmanaged.insert(id);
        transition(id, SessionPhase::Unregistered);
    }

    /// Whether the pad is one of our own emulated devices seen by the host
    fn is_echo(&self, info: &PadInfo) -> bool {
        let Some(ids) = info.usb_ids else {
            return false;
        };
        self.sessions
            .values()
            .any(|session| session.device().usb_ids() == Some(ids))
    }
}
