use crate::protocol::*;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace};

mod bus;
mod device;

pub use bus::Bus;
pub use device::{DeviceStream, StreamWriter};

/// Default address of the bridging service API
pub const DEFAULT_ADDR: &str = "localhost:3242";

/// Operations the bridge needs from the bus service
pub trait BusApi {
    type Reader: AsyncRead + Unpin + Send + 'static;
    type Writer: AsyncWrite + Unpin + Send + 'static;

    fn list_buses(&self) -> impl Future<Output = Result<Vec<BusId>>> + Send;

    fn create_bus(&self, device_count: u32) -> impl Future<Output = Result<BusId>> + Send;

    fn remove_bus(&self, bus_id: BusId) -> impl Future<Output = Result<()>> + Send;

    /// Register an emulated device and open its stream
    fn add_device(
        &self,
        bus_id: BusId,
        profile: DeviceProfile,
    ) -> impl Future<Output = Result<(DeviceStream<Self::Reader, Self::Writer>, RemoteDevice)>> + Send;

    /// Remove an emulated device; removing an unknown device succeeds
    fn remove_device(&self, device: &RemoteDevice) -> impl Future<Output = Result<()>> + Send;
}

pub(crate) struct ClientInner {
    addr: String,
    timeout: Duration,
}

/// Client for the bridging service API
#[derive(Clone)]
pub struct BusClient {
    inner: Arc<ClientInner>,
}

impl BusClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, Duration::from_secs(3))
    }

    pub fn with_timeout(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                addr: addr.into(),
                timeout,
            }),
        }
    }

    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    /// Ask the service for its name and version
    pub async fn ping(&self) -> Result<ServerInfo> {
        self.send_request(&ApiRequest::Ping).await
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = &self.inner.addr;
        let stream = tokio::time::timeout(self.inner.timeout, TcpStream::connect(addr))
            .await
            .with_context(|| format!("Timed out connecting to {}", addr))?
            .with_context(|| format!("Failed to connect to {}", addr))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Send one request on a fresh connection and parse the reply
    pub(crate) async fn send_request<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let path = request.path();
        let exchange = async {
            let mut stream = self.connect().await?;
            stream.write_all(&request.encode()?).await?;

            let mut reader = BufReader::new(&mut stream);
            let mut response = Vec::new();
            reader.read_until(0, &mut response).await?;
            trace!("{} -> {}", path, String::from_utf8_lossy(&response));

            Ok::<_, anyhow::Error>(parse_response(&response)?)
        };

        tokio::time::timeout(self.inner.timeout, exchange)
            .await
            .with_context(|| format!("Request {} timed out", path))?
            .with_context(|| format!("Request {} failed", path))
    }

    async fn open_stream(
        &self,
        device: &RemoteDevice,
    ) -> Result<DeviceStream<OwnedReadHalf, OwnedWriteHalf>> {
        let request = ApiRequest::OpenStream {
            bus_id: device.bus_id,
            dev_id: device.dev_id.clone(),
        };
        let mut stream = self.connect().await?;
        stream
            .write_all(&request.encode()?)
            .await
            .with_context(|| format!("Failed to open stream {}", request.path()))?;

        let (reader, writer) = stream.into_split();
        Ok(DeviceStream::new(reader, writer))
    }
}

impl BusApi for BusClient {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    async fn list_buses(&self) -> Result<Vec<BusId>> {
        let list: BusList = self.send_request(&ApiRequest::ListBuses).await?;
        Ok(list.buses)
    }

    async fn create_bus(&self, device_count: u32) -> Result<BusId> {
        let created: BusCreated = self
            .send_request(&ApiRequest::CreateBus { device_count })
            .await?;
        Ok(created.bus_id)
    }

    async fn remove_bus(&self, bus_id: BusId) -> Result<()> {
        let _: serde_json::Value = self
            .send_request(&ApiRequest::RemoveBus { bus_id })
            .await?;
        Ok(())
    }

    async fn add_device(
        &self,
        bus_id: BusId,
        profile: DeviceProfile,
    ) -> Result<(DeviceStream<OwnedReadHalf, OwnedWriteHalf>, RemoteDevice)> {
        let device: RemoteDevice = self
            .send_request(&ApiRequest::AddDevice { bus_id, profile })
            .await?;
        debug!(
            "Added {} device {} on bus {}",
            profile, device.dev_id, device.bus_id
        );

        match self.open_stream(&device).await {
            Ok(stream) => Ok((stream, device)),
            Err(e) => {
                if let Err(remove_err) = self.remove_device(&device).await {
                    debug!(
                        "Failed to remove device {} after stream error: {:#}",
                        device.dev_id, remove_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn remove_device(&self, device: &RemoteDevice) -> Result<()> {
        let request = ApiRequest::RemoveDevice {
            bus_id: device.bus_id,
            dev_id: device.dev_id.clone(),
        };
        match self.send_request::<serde_json::Value>(&request).await {
            Ok(_) => Ok(()),
            Err(e)
                if e
                    .downcast_ref::<ProtocolError>()
                    .is_some_and(ProtocolError::is_not_found) =>
            {
                trace!("Device {} already gone", device.dev_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
