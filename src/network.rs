//! Telnet transport for TN3270 and TN5250 sessions
//!
//! [`TelnetConnection`] owns the socket (optionally wrapped in TLS) and a
//! reader thread. The thread answers telnet negotiation on its own and hands
//! each complete data stream record to a [`RecordSink`]; records the sink
//! returns are written back immediately.

use std::fs;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::Engine as _;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConnection, RootCertStore, StreamOwned};

use crate::error::ConnectionError;
use crate::protocol::{SecurityMode, TerminalType};
use crate::protocol_common::{frame_record, TelnetDecoder, TelnetEvent};
use crate::telnet_negotiation::TelnetNegotiator;

/// Poll interval of the reader thread, bounding how long `close` waits for it
const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_BUFFER_SIZE: usize = 8192;

// A helper trait alias for objects that implement both Read and Write
trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}

type DynStream = Box<dyn ReadWrite + Send>;
type SharedStream = Arc<Mutex<DynStream>>;

/// Platform trust store, loaded once per process
static NATIVE_ROOTS: Lazy<Vec<CertificateDer<'static>>> = Lazy::new(|| {
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => certs,
        Err(e) => {
            warn!("Could not load platform root certificates: {}", e);
            Vec::new()
        }
    }
});

/// Receiver of inbound records
pub trait RecordSink: Send + Sync {
    /// Handle one record; returned records are sent back to the host in order
    fn on_record(&self, record: Vec<u8>) -> Vec<Vec<u8>>;

    /// The connection ended without `close` being called
    fn on_closed(&self, reason: String);
}

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct ConnectOptions<'a> {
    pub host: &'a str,
    pub port: u16,
    pub security: SecurityMode,
    pub terminal_type: TerminalType,
    pub timeout: Duration,
    /// Extra trusted CA certificates, PEM or DER
    pub ca_bundle: Option<&'a Path>,
}

/// An open telnet session with its reader thread
pub struct TelnetConnection {
    stream: SharedStream,
    /// Clone of the TCP socket used to unblock the reader on close
    socket: TcpStream,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    host: String,
    port: u16,
}

fn lock_stream(stream: &SharedStream) -> std::sync::MutexGuard<'_, DynStream> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TelnetConnection {
    /// Connect, wrap in TLS when requested and start the reader thread
    pub fn connect(options: &ConnectOptions<'_>, sink: Arc<dyn RecordSink>) -> Result<Self, ConnectionError> {
        let host = options.host.to_string();
        let port = options.port;
        let address = resolve(&host, port)?;

        info!("Connecting to {}:{} ({:?})", host, port, options.security);
        let tcp = TcpStream::connect_timeout(&address, options.timeout).map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused => ConnectionError::Refused { host: host.clone(), port },
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionError::Timeout {
                host: host.clone(),
                port,
                timeout_millis: options.timeout.as_millis() as u64,
            },
            _ => ConnectionError::from(e),
        })?;
        tcp.set_nodelay(true)?;
        let socket = tcp.try_clone()?;

        let stream: DynStream = match options.security {
            SecurityMode::None => Box::new(tcp),
            SecurityMode::Tls => Box::new(tls_handshake(&host, tcp, options)?),
        };
        socket.set_read_timeout(Some(READ_POLL_INTERVAL))?;

        let stream: SharedStream = Arc::new(Mutex::new(stream));
        let running = Arc::new(AtomicBool::new(true));
        let reader = spawn_reader(
            Arc::clone(&stream),
            Arc::clone(&running),
            TelnetNegotiator::new(options.terminal_type.id),
            sink,
        )?;

        info!("Connected to {}:{}", host, port);
        Ok(Self {
            stream,
            socket,
            running,
            reader: Some(reader),
            host,
            port,
        })
    }

    /// Frame and write one data stream record
    pub fn send_record(&self, record: &[u8]) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed {
                reason: "connection is closed".to_string(),
            });
        }
        debug!("Sending {} byte record to {}:{}", record.len(), self.host, self.port);
        let mut stream = lock_stream(&self.stream);
        stream.write_all(&frame_record(record))?;
        stream.flush()?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the reader and shut the socket down. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Closing connection to {}:{}", self.host, self.port);
        }
        let _ = self.socket.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            if reader.thread().id() != thread::current().id() {
                let _ = reader.join();
            }
        }
    }
}

impl Drop for TelnetConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConnectionError> {
    let dns_error = || ConnectionError::DnsResolution { host: host.to_string() };
    (host, port)
        .to_socket_addrs()
        .map_err(|_| dns_error())?
        .next()
        .ok_or_else(dns_error)
}

fn tls_handshake(
    host: &str,
    mut tcp: TcpStream,
    options: &ConnectOptions<'_>,
) -> Result<StreamOwned<ClientConnection, TcpStream>, ConnectionError> {
    let handshake_error = |message: String| ConnectionError::Handshake { message };

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let (added, ignored) = roots.add_parsable_certificates(NATIVE_ROOTS.iter().cloned());
    debug!("TLS: {} platform roots added, {} ignored", added, ignored);
    if let Some(path) = options.ca_bundle {
        for cert in load_ca_bundle(path).map_err(handshake_error)? {
            roots.add(cert).map_err(|e| handshake_error(e.to_string()))?;
        }
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let server_name = ServerName::try_from(host)
        .map(|name| name.to_owned())
        .map_err(|e| handshake_error(e.to_string()))?;
    let mut connection =
        ClientConnection::new(Arc::new(config), server_name).map_err(|e| handshake_error(e.to_string()))?;

    tcp.set_read_timeout(Some(options.timeout))?;
    while connection.is_handshaking() {
        connection
            .complete_io(&mut tcp)
            .map_err(|e| handshake_error(e.to_string()))?;
    }
    debug!("TLS handshake with {} complete", host);
    Ok(StreamOwned::new(connection, tcp))
}

/// Certificates from a CA bundle file, either one DER certificate or any
/// number of PEM blocks
pub fn load_ca_bundle(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read CA bundle {}: {}", path.display(), e))?;
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Ok(vec![CertificateDer::from(bytes)]);
    };
    if !text.contains("-----BEGIN CERTIFICATE-----") {
        return Ok(vec![CertificateDer::from(bytes)]);
    }

    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";
    let mut certs = Vec::new();
    let mut rest = text;
    while let Some(begin) = rest.find(BEGIN) {
        let body_start = begin + BEGIN.len();
        let Some(end) = rest[body_start..].find(END) else {
            return Err(format!("unterminated certificate in {}", path.display()));
        };
        let encoded: String = rest[body_start..body_start + end]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| format!("invalid certificate in {}: {}", path.display(), e))?;
        certs.push(CertificateDer::from(der));
        rest = &rest[body_start + end + END.len()..];
    }
    Ok(certs)
}

fn spawn_reader(
    stream: SharedStream,
    running: Arc<AtomicBool>,
    mut negotiator: TelnetNegotiator,
    sink: Arc<dyn RecordSink>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("rte-reader".to_string()).spawn(move || {
        let mut decoder = TelnetDecoder::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        let reason = loop {
            if !running.load(Ordering::SeqCst) {
                break String::new();
            }
            let read_result = lock_stream(&stream).read(&mut buffer);
            let count = match read_result {
                Ok(0) => break "connection closed by host".to_string(),
                Ok(count) => count,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => break e.to_string(),
            };

            let mut outbound = Vec::new();
            for event in decoder.feed(&buffer[..count]) {
                match event {
                    TelnetEvent::Negotiation { command, option } => {
                        outbound.push(negotiator.handle_negotiation(command, option));
                    }
                    TelnetEvent::Subnegotiation { option, data } => {
                        outbound.push(negotiator.handle_subnegotiation(option, &data));
                    }
                    TelnetEvent::Record(record) => {
                        debug!("Received {} byte record", record.len());
                        outbound.extend(sink.on_record(record).iter().map(|reply| frame_record(reply)));
                    }
                }
            }
            let outbound: Vec<u8> = outbound.concat();
            if !outbound.is_empty() {
                let mut guard = lock_stream(&stream);
                if let Err(e) = guard.write_all(&outbound).and_then(|_| guard.flush()) {
                    break e.to_string();
                }
            }
        };

        if running.swap(false, Ordering::SeqCst) {
            info!("Connection lost: {}", reason);
            sink.on_closed(reason);
        }
    })
}
