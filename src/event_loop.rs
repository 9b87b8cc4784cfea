//! The single coordinating task
//!
//! Polls the input subsystem, dispatches attach/detach/update events to the
//! registry and watches the quit channel and shutdown token.

use crate::client::BusApi;
use crate::input::{InputEvent, InputSubsystem};
use crate::registry::Registry;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4);

/// Request from a presentation layer (tray) to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitSignal {
    Quit,
    Exit,
}

/// Why the loop stopped; every variant is a normal shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    InputQuit,
    QuitSignal(QuitSignal),
    Cancelled,
}

pub struct EventLoop<I: InputSubsystem, B: BusApi> {
    input: I,
    registry: Registry<B>,
    quit_rx: mpsc::Receiver<QuitSignal>,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl<I: InputSubsystem, B: BusApi> EventLoop<I, B> {
    pub fn new(
        input: I,
        registry: Registry<B>,
        quit_rx: mpsc::Receiver<QuitSignal>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            input,
            registry,
            quit_rx,
            shutdown,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn registry(&self) -> &Registry<B> {
        &self.registry
    }

    /// Run ticks until input quits, a quit signal arrives or the token is cancelled
    pub async fn run(&mut self) -> ExitReason {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("Polling input every {:?}", self.poll_interval);

        let reason = loop {
            if let Some(reason) = self.tick().await {
                break reason;
            }
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break ExitReason::Cancelled,
                _ = ticker.tick() => {}
            }
        };

        info!("Event loop stopped: {:?}", reason);
        reason
    }

    /// Drain pending events and reap failed sessions once
    pub async fn tick(&mut self) -> Option<ExitReason> {
        while let Some(event) = self.input.poll_event() {
            match event {
                InputEvent::Attached(id) => self.registry.attach(&mut self.input, id).await,
                InputEvent::Detached(id) => self.registry.detach(&mut self.input, id).await,
                InputEvent::UpdateComplete => self.registry.update_all(&mut self.input).await,
                InputEvent::Quit => return Some(ExitReason::InputQuit),
            }
        }
        self.registry.reap(&mut self.input).await;

        // A dropped sender just means no tray is attached.
        if let Ok(signal) = self.quit_rx.try_recv() {
            return Some(ExitReason::QuitSignal(signal));
        }
        if self.shutdown.is_cancelled() {
            return Some(ExitReason::Cancelled);
        }
        None
    }

    /// Hand back the input subsystem and registry for shutdown
    pub fn into_parts(self) -> (I, Registry<B>) {
        (self.input, self.registry)
    }
}
