//! In-process telnet host for integration tests
//!
//! The host negotiates binary/EOR/terminal type, sends its welcome records
//! after an optional delay and answers every inbound record through a
//! responder closure. It can also repaint on a timer to simulate a host that
//! never goes quiet.

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rte_client::protocol_common::{frame_record, TelnetDecoder, TelnetEvent};

pub type Responder = Arc<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// Host side negotiation: DO TERMINAL-TYPE, SB TERMINAL-TYPE SEND, then EOR
/// and BINARY both ways
const NEGOTIATION: &[u8] = &[
    255, 253, 24, //
    255, 250, 24, 1, 255, 240, //
    255, 253, 25, 255, 251, 25, //
    255, 253, 0, 255, 251, 0,
];

#[derive(Clone)]
pub struct HostScript {
    pub welcome: Vec<Vec<u8>>,
    pub welcome_delay: Duration,
    pub responder: Responder,
    pub chatter: Option<(Vec<u8>, Duration)>,
}

impl HostScript {
    pub fn new(welcome: Vec<u8>) -> Self {
        Self {
            welcome: vec![welcome],
            welcome_delay: Duration::ZERO,
            responder: Arc::new(|_| Vec::new()),
            chatter: None,
        }
    }

    pub fn with_welcome_delay(mut self, delay: Duration) -> Self {
        self.welcome_delay = delay;
        self
    }

    pub fn with_responder(mut self, responder: impl Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync + 'static) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// Resend `record` every `interval` once the welcome screen is out
    pub fn with_chatter(mut self, record: Vec<u8>, interval: Duration) -> Self {
        self.chatter = Some((record, interval));
        self
    }
}

pub struct VirtualHost {
    port: u16,
    running: Arc<AtomicBool>,
    sessions: Arc<Mutex<Vec<TcpStream>>>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    acceptor: Option<JoinHandle<()>>,
}

impl VirtualHost {
    pub fn start(script: HostScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();

        let running = Arc::new(AtomicBool::new(true));
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));

        let acceptor = {
            let running = Arc::clone(&running);
            let sessions = Arc::clone(&sessions);
            let received = Arc::clone(&received);
            thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            stream.set_nonblocking(false).unwrap();
                            sessions.lock().unwrap().push(stream.try_clone().unwrap());
                            let script = script.clone();
                            let running = Arc::clone(&running);
                            let received = Arc::clone(&received);
                            thread::spawn(move || serve(stream, script, running, received));
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(10));
                        }
                        Err(_) => break,
                    }
                }
            })
        };

        Self {
            port,
            running,
            sessions,
            received,
            acceptor: Some(acceptor),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Records the host received, telnet framing removed
    pub fn received_records(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }

    /// Drop every session and stop listening
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for session in self.sessions.lock().unwrap().drain(..) {
            let _ = session.shutdown(Shutdown::Both);
        }
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

impl Drop for VirtualHost {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(mut stream: TcpStream, script: HostScript, running: Arc<AtomicBool>, received: Arc<Mutex<Vec<Vec<u8>>>>) {
    if stream.write_all(NEGOTIATION).is_err() {
        return;
    }

    let started = Instant::now();
    while started.elapsed() < script.welcome_delay {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    for record in &script.welcome {
        if stream.write_all(&frame_record(record)).is_err() {
            return;
        }
    }

    stream.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
    let mut decoder = TelnetDecoder::new();
    let mut buffer = [0u8; 4096];
    let mut last_chatter = Instant::now();
    while running.load(Ordering::SeqCst) {
        match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                for event in decoder.feed(&buffer[..n]) {
                    if let TelnetEvent::Record(record) = event {
                        received.lock().unwrap().push(record.clone());
                        for reply in (script.responder)(&record) {
                            if stream.write_all(&frame_record(&reply)).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => break,
        }

        if let Some((record, interval)) = &script.chatter {
            if last_chatter.elapsed() >= *interval {
                if stream.write_all(&frame_record(record)).is_err() {
                    return;
                }
                last_chatter = Instant::now();
            }
        }
    }
}

/// A port nothing listens on
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `check` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

pub mod tn5250 {
    //! 5250 screens of a small sign-on application

    use rte_client::lib5250::codes::*;
    use rte_client::protocol_common::ebcdic::{ebcdic_to_char, string_to_ebcdic};

    pub const USER: &str = "TESTUSR";
    pub const PASSWORD: &str = "TESTPSW";

    fn text(row: u8, column: u8, value: &str) -> Vec<u8> {
        let mut bytes = vec![SBA, row, column];
        bytes.extend(string_to_ebcdic(value));
        bytes
    }

    fn input_field(row: u8, column: u8, attribute: u8, length: u16) -> Vec<u8> {
        let mut bytes = vec![SBA, row, column - 1, SF, 0x40, 0x00, attribute];
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes
    }

    /// "User" input at (6, 53), hidden "Password" input at (7, 53)
    pub fn sign_on() -> Vec<u8> {
        let mut body = vec![ESC, CMD_CLEAR_UNIT, ESC, CMD_WRITE_TO_DISPLAY, 0x00, CC2_UNLOCK_KEYBOARD];
        body.extend(text(1, 36, "Sign On"));
        body.extend(text(2, 48, "System  . . . . . :   TESTSYS"));
        body.extend(text(6, 17, "User  . . . . . . . . . . . . . ."));
        body.extend(input_field(6, 53, 0x24, 10));
        body.extend(text(7, 17, "Password  . . . . . . . . . . . ."));
        body.extend(input_field(7, 53, 0x27, 10));
        body.extend_from_slice(&[IC, 6, 53]);
        build_gds_record(0, OPCODE_PUT_GET, &body)
    }

    /// Main menu, sent with the alarm
    pub fn main_menu() -> Vec<u8> {
        let mut body = vec![
            ESC,
            CMD_CLEAR_UNIT,
            ESC,
            CMD_WRITE_TO_DISPLAY,
            0x00,
            CC2_UNLOCK_KEYBOARD | CC2_ALARM,
        ];
        body.extend(text(1, 2, "MAIN"));
        body.extend(text(1, 33, "IBM i Main Menu"));
        body.extend(text(20, 2, "Selection or command"));
        body.extend(text(21, 2, "===>"));
        body.extend(input_field(21, 7, 0x24, 60));
        body.extend_from_slice(&[IC, 21, 7]);
        build_gds_record(0, OPCODE_PUT_GET, &body)
    }

    /// Keyboard unlock without touching the screen
    pub fn unlock() -> Vec<u8> {
        build_gds_record(0, OPCODE_PUT_GET, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, CC2_UNLOCK_KEYBOARD])
    }

    /// Write the time of day into row 24, keyboard left alone
    pub fn clock_tick() -> Vec<u8> {
        let mut body = vec![ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00];
        body.extend(text(24, 70, "12:00:00"));
        build_gds_record(0, OPCODE_PUT_GET, &body)
    }

    /// Decoded field data of an inbound Enter record
    pub fn submitted_text(record: &[u8]) -> String {
        record
            .get(GDS_HEADER_LEN..)
            .unwrap_or_default()
            .iter()
            .map(|&byte| ebcdic_to_char(byte))
            .collect()
    }

    /// Main menu for the right credentials, the sign-on screen otherwise
    pub fn sign_on_responder(record: &[u8]) -> Vec<Vec<u8>> {
        let aid = record.get(GDS_HEADER_LEN + 2).copied();
        if aid != Some(AID_ENTER) {
            return vec![unlock()];
        }
        let text = submitted_text(record);
        if text.contains(USER) && text.contains(PASSWORD) {
            vec![main_menu()]
        } else {
            vec![sign_on()]
        }
    }
}

pub mod tn3270 {
    //! 3270 screens of a small logon application

    use rte_client::lib3270::codes::*;
    use rte_client::lib3270::display::addressing::encode_12bit_address;
    use rte_client::protocol_common::ebcdic::{ebcdic_to_char, string_to_ebcdic};

    pub const USER: &str = "IBMUSER";
    pub const PASSWORD: &str = "SECRET";

    fn sba(row: usize, column: usize) -> Vec<u8> {
        let mut bytes = vec![ORDER_SBA];
        bytes.extend_from_slice(&encode_12bit_address((row - 1) * 80 + column - 1));
        bytes
    }

    fn protected_text(row: usize, column: usize, value: &str) -> Vec<u8> {
        let mut bytes = sba(row, column);
        bytes.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        bytes.extend(string_to_ebcdic(value));
        bytes
    }

    /// "USERID ===>" input at (5, 20), hidden "PASSWORD ===>" input at (6, 22)
    pub fn logon() -> Vec<u8> {
        let mut record = vec![CMD_ERASE_WRITE, WCC_RESTORE | WCC_RESET_MDT];
        record.extend(protected_text(1, 30, "LOGON"));
        record.extend(protected_text(5, 7, "USERID ===>"));
        record.extend_from_slice(&[ORDER_SF, 0x00]);
        record.extend(sba(5, 29));
        record.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        record.extend(protected_text(6, 7, "PASSWORD ===>"));
        record.extend_from_slice(&[ORDER_SFE, 0x01, XA_3270, DISPLAY_HIDDEN]);
        record.push(ORDER_IC);
        record.extend(sba(6, 29));
        record.extend_from_slice(&[ORDER_SF, ATTR_PROTECTED]);
        record
    }

    pub fn ready() -> Vec<u8> {
        let mut record = vec![CMD_ERASE_WRITE, WCC_RESTORE | WCC_ALARM];
        record.extend(protected_text(1, 1, "READY"));
        record.extend(sba(2, 1));
        record.extend_from_slice(&[ORDER_SF, 0x00]);
        record.push(ORDER_IC);
        record
    }

    /// Main panel for the right credentials, the logon panel otherwise
    pub fn logon_responder(record: &[u8]) -> Vec<Vec<u8>> {
        if record.first() != Some(&AID_ENTER) {
            return vec![vec![CMD_WRITE, WCC_RESTORE]];
        }
        let text: String = record.iter().skip(3).map(|&byte| ebcdic_to_char(byte)).collect();
        if text.contains(USER) && text.contains(PASSWORD) {
            vec![ready()]
        } else {
            vec![logon()]
        }
    }
}
