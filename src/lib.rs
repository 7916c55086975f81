//! Terminal emulation client for IBM 5250 and 3270 hosts
//!
//! Built for driving host applications from scripts and load tests: fill
//! fields, press an attention key, then block until the host has settled.
//!
//! ```no_run
//! use rte_client::{
//!     AttentionKey, Input, Protocol, RteClient, SecurityMode, SyncWaitCondition,
//! };
//!
//! # fn main() -> rte_client::RteResult<()> {
//! let client = RteClient::new(Protocol::Tn5250)?;
//! let terminal_type = Protocol::Tn5250.default_terminal_type();
//! client.connect("as400.example.com", 23, SecurityMode::None, terminal_type, 60_000, 1_000)?;
//! client.send(
//!     &[Input::label("User", "TESTUSR"), Input::label("Password", "TESTPSW")],
//!     AttentionKey::Enter,
//! )?;
//! client.await_conditions(&[SyncWaitCondition::new(10_000, 1_000).into()])?;
//! println!("{}", client.screen());
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

/// Error types shared by every module
pub mod error;

/// Screen coordinates and areas
pub mod position;

/// Screen snapshots and field lookup
pub mod screen;

pub mod input;
pub mod keyboard;

/// Protocol dialects and terminal models
pub mod protocol;

/// PROTOCOL COMMON: Shared protocol functionality for TN5250 and TN3270
/// Provides EBCDIC conversion, the engine trait, and common telnet handling
pub mod protocol_common;

/// LIB5250: IBM 5250 data stream engine
pub mod lib5250;

/// LIB3270: IBM 3270 data stream engine
pub mod lib3270;

pub mod telnet_negotiation;

/// Telnet transport with optional TLS
pub mod network;

/// Wait conditions and the machinery behind `await`
pub mod wait;

pub mod client;
pub mod config;

pub use client::RteClient;
pub use config::ClientConfig;
pub use error::{ConnectionError, RteError, RteResult};
pub use input::{CoordInput, Input, LabelInput};
pub use keyboard::AttentionKey;
pub use position::{Area, Position};
pub use protocol::{Protocol, SecurityMode, TerminalType};
pub use screen::{Field, Screen};
pub use wait::{
    CursorWaitCondition, CustomWaitCondition, SilentWaitCondition, SyncWaitCondition,
    TextWaitCondition, WaitCondition,
};
