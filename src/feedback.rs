//! Per-session rumble listener
//!
//! Reads feedback frames from a device stream and plays them on the physical
//! controller until the stream ends or the session is cancelled.

use crate::input::{ControllerId, Haptics};
use crate::protocol::{FeedbackFrame, ProtocolError};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// How long each received frame drives the motors
pub const RUMBLE_DURATION: Duration = Duration::from_millis(250);

/// Identifies the session whose stream failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFailure {
    pub controller: ControllerId,
    pub serial: u64,
}

/// Why a feedback listener stopped
#[derive(Debug)]
pub enum FeedbackEnd {
    Cancelled,
    StreamClosed(io::Error),
    Decode(ProtocolError),
}

/// Read and apply feedback frames until the stream ends or `token` is cancelled
pub async fn listen<R, H>(mut reader: R, haptics: H, token: CancellationToken) -> FeedbackEnd
where
    R: AsyncRead + Unpin,
    H: Haptics,
{
    let mut buf = [0u8; FeedbackFrame::SIZE];
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return FeedbackEnd::Cancelled,
            read = reader.read_exact(&mut buf) => {
                if let Err(e) = read {
                    return FeedbackEnd::StreamClosed(e);
                }
            }
        }

        let frame = match FeedbackFrame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => return FeedbackEnd::Decode(e),
        };
        let (left, right) = frame.duties();
        if let Err(e) = haptics.rumble(left, right, RUMBLE_DURATION) {
            debug!("Rumble failed: {:#}", e);
        }
    }
}

/// Handle to a spawned feedback listener
pub struct FeedbackTask {
    token: CancellationToken,
    handle: JoinHandle<FeedbackEnd>,
}

impl FeedbackTask {
    /// Spawn a listener; stream failures are reported on `failures`
    pub fn spawn<R, H>(
        reader: R,
        haptics: H,
        token: CancellationToken,
        origin: StreamFailure,
        failures: mpsc::UnboundedSender<StreamFailure>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        H: Haptics,
    {
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let end = listen(reader, haptics, task_token).await;
            match &end {
                FeedbackEnd::Cancelled => trace!("Feedback for {} cancelled", origin.controller),
                FeedbackEnd::StreamClosed(e) => {
                    debug!("Feedback stream for {} ended: {}", origin.controller, e);
                    let _ = failures.send(origin);
                }
                FeedbackEnd::Decode(e) => {
                    warn!("Bad feedback frame for {}: {}", origin.controller, e);
                }
            }
            end
        });

        Self { token, handle }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the listener and wait until it no longer touches the stream
    pub async fn stop(self) -> FeedbackEnd {
        self.token.cancel();
        match self.handle.await {
            Ok(end) => end,
            Err(e) => {
                warn!("Feedback task failed: {}", e);
                FeedbackEnd::Cancelled
            }
        }
    }
}
