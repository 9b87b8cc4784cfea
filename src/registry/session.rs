use crate::client::{DeviceStream, StreamWriter};
use crate::feedback::{FeedbackEnd, FeedbackTask, StreamFailure};
use crate::input::{ControllerId, Haptics};
use crate::protocol::{InputState, RemoteDevice};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Live pairing of one physical controller with one emulated device
pub struct Session<W> {
    controller: ControllerId,
    serial: u64,
    device: RemoteDevice,
    writer: StreamWriter<W>,
    last_state: InputState,
    feedback: FeedbackTask,
}

impl<W: AsyncWrite + Unpin + Send> Session<W> {
    /// Take ownership of a freshly opened device stream and start its feedback listener
    pub(crate) fn start<R, H>(
        controller: ControllerId,
        serial: u64,
        stream: DeviceStream<R, W>,
        device: RemoteDevice,
        haptics: H,
        token: CancellationToken,
        failures: mpsc::UnboundedSender<StreamFailure>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        H: Haptics,
    {
        let (reader, writer) = stream.into_parts();
        let origin = StreamFailure { controller, serial };
        let feedback = FeedbackTask::spawn(reader, haptics, token, origin, failures);

        Self {
            controller,
            serial,
            device,
            writer,
            last_state: InputState::default(),
            feedback,
        }
    }

    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn device(&self) -> &RemoteDevice {
        &self.device
    }

    pub fn last_state(&self) -> &InputState {
        &self.last_state
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.feedback.token()
    }

    /// Record and send a translated state
    pub async fn push(&mut self, state: InputState) -> io::Result<()> {
        self.last_state = state;
        self.writer.write_state(&state).await
    }

    /// Stop the feedback listener, then close the stream
    ///
    /// Returns the remote device so the caller can remove it from the bus.
    pub async fn close(self) -> RemoteDevice {
        let Session {
            controller,
            device,
            mut writer,
            feedback,
            ..
        } = self;

        let end = feedback.stop().await;
        if !matches!(end, FeedbackEnd::Cancelled) {
            trace!("Feedback for {} had already ended: {:?}", controller, end);
        }
        writer.close().await;
        device
    }
}
