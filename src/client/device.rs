use crate::protocol::InputState;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Bidirectional byte stream of one emulated device
///
/// Outbound traffic is canonical input state, inbound traffic is feedback frames.
pub struct DeviceStream<R, W> {
    reader: R,
    writer: StreamWriter<W>,
}

impl<R, W> DeviceStream<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer: StreamWriter::new(writer),
        }
    }

    pub fn into_parts(self) -> (R, StreamWriter<W>) {
        (self.reader, self.writer)
    }
}

/// Outbound half of a device stream
///
/// Closing is idempotent; writes after close fail with `NotConnected`.
pub struct StreamWriter<W> {
    inner: Option<W>,
}

impl<W> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    pub async fn write_state(&mut self, state: &InputState) -> io::Result<()> {
        let writer = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device stream closed"))?;
        writer.write_all(&state.to_bytes()).await?;
        writer.flush().await
    }

    pub async fn close(&mut self) {
        let Some(mut writer) = self.inner.take() else {
            return;
        };
        // Peer may already be gone
        if let Err(e) = writer.shutdown().await {
            trace!("Device stream shutdown: {}", e);
        }
    }
}
