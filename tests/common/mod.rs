//! In-process doubles for the input subsystem and the bus service

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use padbridge::client::{BusApi, DeviceStream};
use padbridge::input::{
    ControllerId, Haptics, HardwareId, InputEvent, InputSubsystem, PadInfo, RawSnapshot,
};
use padbridge::protocol::{BusId, DeviceProfile, RemoteDevice};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf, ReadHalf, WriteHalf};

pub const XBOX_VID: &str = "0x045e";
pub const XBOX_PID: &str = "0x028e";

/// Ordered record of observable side effects, shared by all doubles
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }
}

/// A physical pad as the fake input subsystem sees it
#[derive(Debug, Clone)]
pub struct FakePad {
    pub info: PadInfo,
    pub identity: Option<HardwareId>,
    pub snapshot: RawSnapshot,
}

impl FakePad {
    pub fn capable(name: &str, serial: u8) -> Self {
        let mut uuid = [0u8; 16];
        uuid[15] = serial;
        Self {
            info: PadInfo {
                name: name.to_string(),
                usb_ids: Some((0x054c, 0x09cc)),
            },
            identity: Some(HardwareId(uuid)),
            snapshot: RawSnapshot::default(),
        }
    }

    pub fn incapable(name: &str) -> Self {
        Self {
            identity: None,
            ..Self::capable(name, 0)
        }
    }

    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.info.usb_ids = Some((vid, pid));
        self
    }
}

pub type RumbleLog = Arc<Mutex<Vec<(ControllerId, u16, u16, Duration)>>>;

#[derive(Clone)]
pub struct FakeHaptics {
    id: ControllerId,
    log: RumbleLog,
}

impl Haptics for FakeHaptics {
    fn rumble(&self, left: u16, right: u16, duration: Duration) -> Result<()> {
        self.log.lock().unwrap().push((self.id, left, right, duration));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeInput {
    events: VecDeque<InputEvent>,
    pads: HashMap<ControllerId, FakePad>,
    opened: HashSet<ControllerId>,
    pub released: Vec<ControllerId>,
    pub rumbles: RumbleLog,
    journal: Journal,
}

impl FakeInput {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Connect a pad and queue its attach event
    pub fn plug(&mut self, id: ControllerId, pad: FakePad) {
        self.pads.insert(id, pad);
        self.events.push_back(InputEvent::Attached(id));
    }

    /// Queue a detach event; the pad stays known so earlier queued events still resolve
    pub fn unplug(&mut self, id: ControllerId) {
        self.events.push_back(InputEvent::Detached(id));
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn set_snapshot(&mut self, id: ControllerId, snapshot: RawSnapshot) {
        if let Some(pad) = self.pads.get_mut(&id) {
            pad.snapshot = snapshot;
        }
    }

    pub fn is_open(&self, id: ControllerId) -> bool {
        self.opened.contains(&id)
    }

    pub fn rumbles(&self) -> Vec<(ControllerId, u16, u16, Duration)> {
        self.rumbles.lock().unwrap().clone()
    }
}

impl InputSubsystem for FakeInput {
    type Haptics = FakeHaptics;

    fn poll_event(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    fn open(&mut self, id: ControllerId) -> Result<PadInfo> {
        let pad = self
            .pads
            .get(&id)
            .ok_or_else(|| anyhow!("controller {} not connected", id))?;
        self.opened.insert(id);
        Ok(pad.info.clone())
    }

    fn stable_identity(&self, id: ControllerId) -> Option<HardwareId> {
        self.pads.get(&id).and_then(|pad| pad.identity)
    }

    fn snapshot(&self, id: ControllerId) -> Option<RawSnapshot> {
        self.pads.get(&id).map(|pad| pad.snapshot)
    }

    fn haptics(&self, id: ControllerId) -> FakeHaptics {
        FakeHaptics {
            id,
            log: self.rumbles.clone(),
        }
    }

    fn release(&mut self, id: ControllerId) {
        if self.opened.remove(&id) {
            self.journal.record(format!("released {}", id));
            self.released.push(id);
        }
    }
}

/// Feedback half of a fake device stream; records when it is dropped
pub struct LoggedReader {
    inner: ReadHalf<DuplexStream>,
    dev_id: String,
    journal: Journal,
}

impl AsyncRead for LoggedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for LoggedReader {
    fn drop(&mut self) {
        self.journal.record(format!("feedback-ended {}", self.dev_id));
    }
}

/// State half of a fake device stream; records shutdown
pub struct LoggedWriter {
    inner: WriteHalf<DuplexStream>,
    dev_id: String,
    journal: Journal,
}

impl AsyncWrite for LoggedWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        if result.is_ready() {
            self.journal.record(format!("stream-closed {}", self.dev_id));
        }
        result
    }
}

#[derive(Default)]
struct BusState {
    buses: Vec<BusId>,
    next_bus: BusId,
    next_dev: u32,
    fail_add: bool,
    added: Vec<RemoteDevice>,
    removed_devices: Vec<String>,
    removed_buses: Vec<BusId>,
    remotes: HashMap<String, DuplexStream>,
}

/// Bus service double; clones share state
#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<Mutex<BusState>>,
    journal: Journal,
}

impl FakeBus {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                next_bus: 1,
                ..Default::default()
            })),
            journal,
        }
    }

    pub fn with_buses(self, buses: &[BusId]) -> Self {
        self.state.lock().unwrap().buses = buses.to_vec();
        self
    }

    pub fn fail_add(&self, fail: bool) {
        self.state.lock().unwrap().fail_add = fail;
    }

    pub fn added(&self) -> Vec<RemoteDevice> {
        self.state.lock().unwrap().added.clone()
    }

    pub fn removed_devices(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_devices.clone()
    }

    pub fn removed_buses(&self) -> Vec<BusId> {
        self.state.lock().unwrap().removed_buses.clone()
    }

    pub fn buses(&self) -> Vec<BusId> {
        self.state.lock().unwrap().buses.clone()
    }

    /// Service side of an added device's stream
    pub fn take_remote(&self, dev_id: &str) -> DuplexStream {
        self.state
            .lock()
            .unwrap()
            .remotes
            .remove(dev_id)
            .expect("no remote stream for device")
    }
}

impl BusApi for FakeBus {
    type Reader = LoggedReader;
    type Writer = LoggedWriter;

    async fn list_buses(&self) -> Result<Vec<BusId>> {
        Ok(self.buses())
    }

    async fn create_bus(&self, _device_count: u32) -> Result<BusId> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_bus;
        state.next_bus += 1;
        state.buses.push(id);
        Ok(id)
    }

    async fn remove_bus(&self, bus_id: BusId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.buses.retain(|b| *b != bus_id);
        state.removed_buses.push(bus_id);
        Ok(())
    }

    async fn add_device(
        &self,
        bus_id: BusId,
        profile: DeviceProfile,
    ) -> Result<(DeviceStream<LoggedReader, LoggedWriter>, RemoteDevice)> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add {
            return Err(anyhow!("bus {} is full", bus_id));
        }

        state.next_dev += 1;
        let device = RemoteDevice {
            bus_id,
            dev_id: state.next_dev.to_string(),
            vid: XBOX_VID.to_string(),
            pid: XBOX_PID.to_string(),
            device_type: profile.as_str().to_string(),
        };

        let (local, remote) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let stream = DeviceStream::new(
            LoggedReader {
                inner: reader,
                dev_id: device.dev_id.clone(),
                journal: self.journal.clone(),
            },
            LoggedWriter {
                inner: writer,
                dev_id: device.dev_id.clone(),
                journal: self.journal.clone(),
            },
        );

        state.remotes.insert(device.dev_id.clone(), remote);
        state.added.push(device.clone());
        Ok((stream, device))
    }

    async fn remove_device(&self, device: &RemoteDevice) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .removed_devices
            .push(device.dev_id.clone());
        self.journal.record(format!("removed {}", device.dev_id));
        Ok(())
    }
}

/// Run `check` between yields until it holds, failing after one second
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}
