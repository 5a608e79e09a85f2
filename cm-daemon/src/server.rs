//! Unix Socket Server
//!
//! Async server answering alarm queries against the shared [`Monitor`].
//!
//! # Security Features
//! - **Read-only**: alarm write requests are always refused
//! - **Peer credentials**: UID/GID/PID logged for every connection
//! - **Connection limits**: maximum concurrent connections enforced
//! - **Timeouts**: read/write timeouts prevent resource exhaustion
//! - **Message limits**: bounded line reads prevent memory exhaustion
//!
//! The monitor lock is held only for the duration of one snapshot, so
//! answering a query never waits on hardware I/O.

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cm_core::constants::ipc::{MAX_CONNECTIONS, SOCKET_MODE};
use cm_core::Monitor;
use cm_protocol::{AlarmEntry, Request, RequestEnvelope, Response, ResponseEnvelope, MAX_MESSAGE_SIZE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Read timeout per request line
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per response
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(out.len());
        }

        let mut take_len = available.len();
        let mut found_newline = false;
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            take_len = pos + 1;
            found_newline = true;
        }

        let remaining = max_len.saturating_sub(out.len());
        if take_len > remaining {
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "Message too large"));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

/// Bind the query socket and serve until Ctrl-C
pub async fn run_server(socket_path: &Path, monitor: Monitor) -> Result<(), Box<dyn std::error::Error>> {
    if socket_path.exists() {
        let metadata = socket_path.symlink_metadata()?;
        if metadata.file_type().is_symlink() {
            return Err("Socket path is a symlink - refusing for security".into());
        }
        std::fs::remove_file(socket_path)?;
        debug!("Removed existing socket file");
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    info!("Listening on {} (mode {:o})", socket_path.display(), SOCKET_MODE);
    info!("Security: max_conn={}, max_msg={}", MAX_CONNECTIONS, MAX_MESSAGE_SIZE);

    let handled = serve(listener, monitor, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await;

    let _ = std::fs::remove_file(socket_path);
    info!("Server stopped (handled {} total connections)", handled);
    Ok(())
}

/// Accept connections until `shutdown` resolves; returns the number accepted
async fn serve<F: Future<Output = ()>>(listener: UnixListener, monitor: Monitor, shutdown: F) -> u64 {
    let active = Arc::new(AtomicUsize::new(0));
    let mut handled: u64 = 0;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let current = active.load(Ordering::SeqCst);
                        if current >= MAX_CONNECTIONS {
                            warn!("Connection limit reached ({}), rejecting new connection", current);
                            drop(stream);
                            continue;
                        }

                        active.fetch_add(1, Ordering::SeqCst);
                        handled += 1;
                        let active = active.clone();
                        let monitor = monitor.clone();
                        tokio::spawn(async move {
                            handle_client(stream, monitor).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    handled
}

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

async fn handle_client(stream: UnixStream, monitor: Monitor) {
    let cred = match get_peer_credentials(&stream) {
        Some(c) => c,
        None => {
            error!("Failed to get peer credentials, rejecting connection");
            return;
        }
    };
    debug!("Connection from uid={}, gid={}, pid={}", cred.uid, cred.gid, cred.pid);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(1024);
    let mut request_count: u64 = 0;
    let connection_start = Instant::now();

    loop {
        let read_result = timeout(READ_TIMEOUT, read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE)).await;

        match read_result {
            Ok(Ok(0)) => {
                debug!(
                    "Client disconnected: uid={}, pid={}, requests={}, duration={:?}",
                    cred.uid,
                    cred.pid,
                    request_count,
                    connection_start.elapsed()
                );
                break;
            }
            Ok(Ok(n)) => {
                request_count += 1;
                trace!("Request #{} from uid={}: {} bytes", request_count, cred.uid, n);

                let response_envelope = match std::str::from_utf8(&line) {
                    Ok(s) => process_request(s, &cred, &monitor),
                    Err(e) => {
                        debug!("Non-UTF8 request from uid={}: {}", cred.uid, e);
                        let _ = send_response(&mut writer, &ResponseEnvelope::new(0, Response::error("Invalid request encoding"))).await;
                        break;
                    }
                };

                if send_response(&mut writer, &response_envelope).await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    warn!(
                        "Message too large (>{} bytes) from uid={}, pid={}",
                        MAX_MESSAGE_SIZE, cred.uid, cred.pid
                    );
                    let _ = send_response(&mut writer, &ResponseEnvelope::new(0, Response::error("Message too large"))).await;
                } else {
                    error!("Read error from uid={}, pid={}: {}", cred.uid, cred.pid, e);
                }
                break;
            }
            Err(_) => {
                debug!("Read timeout for uid={}, pid={}", cred.uid, cred.pid);
                let _ = send_response(&mut writer, &ResponseEnvelope::new(0, Response::error("Read timeout"))).await;
                break;
            }
        }
    }
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response_envelope: &ResponseEnvelope,
) -> Result<(), ()> {
    let response_json = serde_json::to_string(response_envelope).unwrap_or_else(|_| {
        r#"{"id":0,"status":"error","message":"Serialization error"}"#.to_string()
    });

    let write_result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    match write_result {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            error!("Write error: {}", e);
            Err(())
        }
        Err(_) => {
            error!("Write timeout");
            Err(())
        }
    }
}

/// Get peer credentials (uid, gid, pid) from Unix socket
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();

    #[cfg(target_os = "linux")]
    {
        // SAFETY: ucred is a plain C struct with no pointers; all-zero is a valid value.
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: fd is a live socket owned by `stream`, and cred/len describe
        // a correctly sized, writable ucred buffer.
        let result = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };

        if result == 0 {
            return Some(PeerCredentials {
                uid: cred.uid,
                gid: cred.gid,
                pid: cred.pid,
            });
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        let mut uid: libc::uid_t = 0;
        let mut gid: libc::gid_t = 0;

        // SAFETY: fd is a live socket owned by `stream`; uid/gid are valid out-pointers.
        let result = unsafe { libc::getpeereid(fd, &mut uid, &mut gid) };

        if result == 0 {
            return Some(PeerCredentials { uid, gid, pid: 0 });
        }
    }

    None
}

fn process_request(line: &str, cred: &PeerCredentials, monitor: &Monitor) -> ResponseEnvelope {
    let envelope: RequestEnvelope = match serde_json::from_str(line.trim()) {
        Ok(e) => e,
        Err(e) => {
            debug!("Invalid JSON from uid={}: {}", cred.uid, e);
            return ResponseEnvelope::new(0, Response::error("Invalid request format"));
        }
    };

    let request_id = envelope.id;
    let request = envelope.request;

    if let Err(e) = request.validate() {
        warn!("Request validation failed from uid={}: {}", cred.uid, e);
        return ResponseEnvelope::new(request_id, Response::error(e));
    }

    if request.is_write() {
        warn!(
            "AUDIT: refused {} from uid={}, pid={}",
            request.type_name(),
            cred.uid,
            cred.pid
        );
    } else {
        trace!("{} from uid={}", request.type_name(), cred.uid);
    }

    ResponseEnvelope::new(request_id, dispatch(&request, monitor))
}

fn dispatch(request: &Request, monitor: &Monitor) -> Response {
    match request {
        Request::Ping => Response::ok_string("pong"),
        Request::Version => Response::ok_string(VERSION),
        Request::ListAlarms => {
            let alarms: Vec<AlarmEntry> = monitor.active_alarms().into_iter().map(AlarmEntry::from).collect();
            Response::ok_alarms(alarms)
        }
        Request::SetAlarm { .. } | Request::ClearAlarm { .. } => Response::read_only(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_core::MonitorConfig;
    use cm_protocol::READ_ONLY_MESSAGE;

    const CRED: PeerCredentials = PeerCredentials { uid: 1000, gid: 1000, pid: 42 };

    fn request_line(id: u64, request: Request) -> String {
        serde_json::to_string(&RequestEnvelope::with_id(request, id)).unwrap()
    }

    #[test]
    fn test_alarm_writes_refused() {
        let monitor = Monitor::new(MonitorConfig::default());
        for request in [
            Request::SetAlarm { condition: "PSU 1 absent".into() },
            Request::ClearAlarm { condition: "PSU 1 absent".into() },
        ] {
            let response = process_request(&request_line(7, request), &CRED, &monitor);
            assert_eq!(response.id, 7);
            assert_eq!(response.response, Response::error(READ_ONLY_MESSAGE));
        }
    }

    #[test]
    fn test_ping_and_version() {
        let monitor = Monitor::new(MonitorConfig::default());
        assert_eq!(dispatch(&Request::Ping, &monitor), Response::ok_string("pong"));
        assert_eq!(dispatch(&Request::Version, &monitor), Response::ok_string(VERSION));
    }

    #[test]
    fn test_list_alarms_empty() {
        let monitor = Monitor::new(MonitorConfig::default());
        assert_eq!(dispatch(&Request::ListAlarms, &monitor), Response::ok_alarms(Vec::new()));
    }

    #[test]
    fn test_invalid_json() {
        let monitor = Monitor::new(MonitorConfig::default());
        let response = process_request("{not json", &CRED, &monitor);
        assert_eq!(response.id, 0);
        assert!(matches!(response.response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_read_line_bounded() {
        let mut input: &[u8] = b"{\"id\":1}\nrest";
        let mut line = Vec::new();
        assert_eq!(read_line_bounded(&mut input, &mut line, 64).await.unwrap(), 9);
        assert_eq!(line, b"{\"id\":1}\n");

        let mut oversized: &[u8] = &[b'x'; 128];
        let err = read_line_bounded(&mut oversized, &mut line, 64).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_serve_answers_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let monitor = Monitor::new(MonitorConfig::default());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, monitor, async {
            let _ = stop_rx.await;
        }));

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(format!("{}\n", request_line(3, Request::Ping)).as_bytes())
            .await
            .unwrap();
        let mut lines = BufReader::new(reader).lines();
        let reply = lines.next_line().await.unwrap().unwrap();
        let envelope: ResponseEnvelope = serde_json::from_str(&reply).unwrap();
        assert_eq!(envelope.id, 3);
        assert_eq!(envelope.response, Response::ok_string("pong"));

        stop_tx.send(()).unwrap();
        assert_eq!(server.await.unwrap(), 1);
    }

    #[test]
    fn test_monitor_is_shareable() {
        fn is_shareable<T: Send + Sync + Clone>() {}
        is_shareable::<Monitor>();
    }
}
