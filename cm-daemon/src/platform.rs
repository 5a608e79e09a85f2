//! Platform feed client
//!
//! Implements [`HardwareSource`] against the platform hardware-state service.
//! Two connections are kept: a query connection (scans and attribute
//! lookups, with a read timeout) and a subscription connection that blocks
//! without timeout waiting for the next event. Both are dropped on any
//! failure; the next rebuild reconnects.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use cm_core::constants::{ipc::MAX_PLATFORM_MESSAGE_SIZE, timing::PLATFORM_QUERY_TIMEOUT};
use cm_core::{
    Airflow, AttributeLookup, ChassisError, EntityFact, EntityType, FanFact, HardwareEvent, HardwareSource, Result,
    TempEntityFaultFact, TempFaultFact,
};
use cm_protocol::platform::{PlatformData, PlatformEvent, PlatformRequest, PlatformResponse};
use tracing::{debug, info, trace};

struct Connection {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl Connection {
    fn open(path: &Path, with_timeout: bool) -> Result<Self> {
        let stream = UnixStream::connect(path).map_err(|e| {
            ChassisError::transport(format!("Failed to connect to platform service at {}: {}", path.display(), e))
        })?;
        if with_timeout {
            stream.set_read_timeout(Some(PLATFORM_QUERY_TIMEOUT))?;
        }
        stream.set_write_timeout(Some(PLATFORM_QUERY_TIMEOUT))?;
        let reader = stream
            .try_clone()
            .map_err(|e| ChassisError::transport(format!("Failed to clone platform socket: {}", e)))?;
        Ok(Self {
            writer: stream,
            reader: BufReader::new(reader),
        })
    }

    fn send(&mut self, request: &PlatformRequest) -> Result<()> {
        let mut json = serde_json::to_vec(request)?;
        json.push(b'\n');
        self.writer
            .write_all(&json)
            .map_err(|e| ChassisError::transport(format!("Failed to send {}: {}", request.type_name(), e)))
    }

    /// Next line, or `None` at EOF
    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let limit = MAX_PLATFORM_MESSAGE_SIZE as u64 + 1;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .map_err(|e| ChassisError::transport(format!("Failed to read from platform service: {}", e)))?;
        if n == 0 {
            return Ok(None);
        }
        if buf.len() > MAX_PLATFORM_MESSAGE_SIZE {
            return Err(ChassisError::MessageTooLarge {
                size: buf.len(),
                max_size: MAX_PLATFORM_MESSAGE_SIZE,
            });
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    fn read_response(&mut self, request: &PlatformRequest) -> Result<PlatformData> {
        let line = self
            .read_line()?
            .ok_or_else(|| ChassisError::transport("Platform service closed connection"))?;
        match serde_json::from_slice::<PlatformResponse>(&line)? {
            PlatformResponse::Ok(data) => Ok(data),
            PlatformResponse::Error { message } => Err(ChassisError::PlatformRejected {
                request: request.type_name().to_string(),
                message,
            }),
        }
    }
}

pub struct PlatformClient {
    socket_path: PathBuf,
    query: Option<Connection>,
    events: Option<Connection>,
}

impl PlatformClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            query: None,
            events: None,
        }
    }

    fn query(&mut self, request: PlatformRequest) -> Result<PlatformData> {
        trace!("Platform query: {}", request.type_name());
        if self.query.is_none() {
            self.query = Some(Connection::open(&self.socket_path, true)?);
        }
        let result = match self.query.as_mut() {
            Some(conn) => conn.send(&request).and_then(|_| conn.read_response(&request)),
            None => Err(ChassisError::transport("Platform query connection unavailable")),
        };
        // A rejected request leaves the stream in sync; anything else may not
        if let Err(e) = &result {
            if !matches!(e, ChassisError::PlatformRejected { .. }) {
                self.query = None;
            }
        }
        result
    }

    fn missing(request: &PlatformRequest, field: &str) -> ChassisError {
        ChassisError::IpcProtocol(format!("{} response is missing '{}'", request.type_name(), field))
    }
}

impl AttributeLookup for PlatformClient {
    fn airflow(&mut self, entity_type: &EntityType, slot: u32) -> Result<Airflow> {
        let data = self.query(PlatformRequest::GetAirflow {
            entity_type: entity_type.name().to_string(),
            slot,
        })?;
        Ok(data.airflow.as_deref().map(Airflow::parse).unwrap_or(Airflow::Unknown))
    }
}

impl HardwareSource for PlatformClient {
    fn subscribe(&mut self) -> Result<()> {
        self.events = None;
        let mut conn = Connection::open(&self.socket_path, false)?;
        let request = PlatformRequest::Subscribe;
        conn.send(&request)?;
        // The acknowledgement is a normal response line, read under a timeout
        conn.writer.set_read_timeout(Some(PLATFORM_QUERY_TIMEOUT))?;
        conn.read_response(&request)?;
        conn.writer.set_read_timeout(None)?;
        self.events = Some(conn);
        info!("Subscribed to platform events at {}", self.socket_path.display());
        Ok(())
    }

    fn scan_entities(&mut self) -> Result<Vec<EntityFact>> {
        let request = PlatformRequest::ScanEntities;
        let data = self.query(request.clone())?;
        let records = data.entities.ok_or_else(|| Self::missing(&request, "entities"))?;
        records.iter().map(EntityFact::try_from).collect()
    }

    fn scan_fans(&mut self) -> Result<Vec<FanFact>> {
        let request = PlatformRequest::ScanFans;
        let data = self.query(request.clone())?;
        let records = data.fans.ok_or_else(|| Self::missing(&request, "fans"))?;
        records.iter().map(FanFact::try_from).collect()
    }

    fn scan_temp_faults(&mut self) -> Result<Vec<TempFaultFact>> {
        let request = PlatformRequest::ScanTempFaults;
        let data = self.query(request.clone())?;
        let records = data.temp_faults.ok_or_else(|| Self::missing(&request, "temp_faults"))?;
        records.iter().map(TempFaultFact::try_from).collect()
    }

    fn scan_temp_entity_faults(&mut self) -> Result<Vec<TempEntityFaultFact>> {
        let request = PlatformRequest::ScanTempEntityFaults;
        let data = self.query(request.clone())?;
        let records = data
            .temp_entity_faults
            .ok_or_else(|| Self::missing(&request, "temp_entity_faults"))?;
        records.iter().map(TempEntityFaultFact::try_from).collect()
    }

    fn next_event(&mut self) -> Result<HardwareEvent> {
        let conn = self.events.as_mut().ok_or(ChassisError::SubscriptionClosed)?;
        let line = match conn.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                self.events = None;
                return Err(ChassisError::SubscriptionClosed);
            }
            Err(e) => {
                self.events = None;
                return Err(e);
            }
        };
        let event: PlatformEvent = serde_json::from_slice(&line)?;
        let event = HardwareEvent::try_from(&event)?;
        debug!("Platform event: {}", event.category());
        Ok(event)
    }
}
