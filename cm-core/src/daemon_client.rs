//! Daemon Client
//!
//! Talks to the chassismond alarm-query socket. One JSON request line out,
//! one JSON response line back, matched by request id.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use cm_protocol::{AlarmEntry, Request, RequestEnvelope, Response, ResponseEnvelope, MAX_MESSAGE_SIZE};

use crate::constants::timing::DAEMON_CLIENT_TIMEOUT;
use crate::error::{ChassisError, Result};

/// Initial buffer size for responses
const INITIAL_BUFFER_SIZE: usize = 4096;

pub struct DaemonClient {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl DaemonClient {
    /// Connect to the daemon socket at `path`
    pub fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).map_err(|e| {
            ChassisError::DaemonConnection(format!("Failed to connect to daemon at {}: {}", path.display(), e))
        })?;
        stream.set_read_timeout(Some(DAEMON_CLIENT_TIMEOUT))?;
        stream.set_write_timeout(Some(DAEMON_CLIENT_TIMEOUT))?;
        let reader_stream = stream.try_clone().map_err(|e| {
            ChassisError::DaemonConnection(format!("Failed to clone daemon socket for reader: {}", e))
        })?;

        Ok(Self {
            writer: stream,
            reader: BufReader::new(reader_stream),
        })
    }

    /// Send a request and wait for its response
    pub fn request(&mut self, req: Request) -> Result<Response> {
        req.validate()
            .map_err(|e| ChassisError::DaemonRequest(format!("Request validation failed: {}", e)))?;

        let request_id = cm_protocol::generate_request_id();
        let envelope = RequestEnvelope::with_id(req.clone(), request_id);
        let mut json = serde_json::to_vec(&envelope)?;
        json.push(b'\n');
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(ChassisError::MessageTooLarge {
                size: json.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        self.writer
            .write_all(&json)
            .map_err(|e| ChassisError::DaemonRequest(format!("Failed to send request: {}", e)))?;

        let mut response_buf: Vec<u8> = Vec::with_capacity(INITIAL_BUFFER_SIZE);
        self.reader
            .read_until(b'\n', &mut response_buf)
            .map_err(|e| ChassisError::DaemonResponse(format!("Failed to read response: {}", e)))?;
        if response_buf.is_empty() {
            return Err(ChassisError::DaemonConnection("Daemon closed connection".to_string()));
        }
        if response_buf.len() > MAX_MESSAGE_SIZE {
            return Err(ChassisError::MessageTooLarge {
                size: response_buf.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }
        if response_buf.last() == Some(&b'\n') {
            response_buf.pop();
        }

        let response_envelope: ResponseEnvelope = serde_json::from_slice(&response_buf)
            .map_err(|e| ChassisError::DaemonResponse(format!("Failed to parse response: {}", e)))?;
        if response_envelope.id != request_id {
            return Err(ChassisError::IpcProtocol(format!(
                "Response ID mismatch: expected {}, got {}",
                request_id, response_envelope.id
            )));
        }
        Self::verify_response_type(&req, &response_envelope.response)?;

        Ok(response_envelope.response)
    }

    fn verify_response_type(req: &Request, resp: &Response) -> Result<()> {
        let Response::Ok(data) = resp else {
            return Ok(());
        };
        let valid = match req {
            Request::Ping | Request::Version => data.value.is_some(),
            Request::ListAlarms => data.alarms.is_some(),
            _ => true,
        };
        if !valid {
            return Err(ChassisError::IpcProtocol(format!(
                "Response type mismatch for request {}",
                req.type_name()
            )));
        }
        Ok(())
    }

    pub fn ping(&mut self) -> Result<String> {
        self.request_value(Request::Ping)
    }

    pub fn version(&mut self) -> Result<String> {
        self.request_value(Request::Version)
    }

    /// Active alarms in snapshot order
    pub fn list_alarms(&mut self) -> Result<Vec<AlarmEntry>> {
        match self.request(Request::ListAlarms)? {
            Response::Ok(data) => Ok(data.alarms.unwrap_or_default()),
            Response::Error { message } => Err(ChassisError::DaemonResponse(message)),
        }
    }

    fn request_value(&mut self, req: Request) -> Result<String> {
        match self.request(req)? {
            Response::Ok(data) => Ok(data.value.unwrap_or_default()),
            Response::Error { message } => Err(ChassisError::DaemonResponse(message)),
        }
    }
}
