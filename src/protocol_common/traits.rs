//! The terminal-display engine abstraction
//!
//! Both dialects decode host records into a presentation space and encode
//! operator actions back into records. The client drives an engine only through
//! [`TerminalEngine`], so the wait machinery never sees a data stream.

use crate::error::ProtocolResult;
use crate::keyboard::AttentionKey;
use crate::position::Position;
use crate::protocol::TerminalType;
use crate::screen::Screen;

/// What changed while processing one host record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineUpdate {
    /// Characters, attributes or the field layout changed
    pub screen_changed: bool,
    /// The cursor moved (or became known)
    pub cursor_moved: bool,
    /// Keyboard state the host signalled: `Some(false)` for an explicit
    /// unlock (restore keyboard), `Some(true)` for a lock
    pub keyboard_locked: Option<bool>,
    /// The host asked for the alarm
    pub alarm: bool,
    /// Records to send back right away (query replies, read responses)
    pub replies: Vec<Vec<u8>>,
}

impl EngineUpdate {
    /// Merge a later update into this one
    pub fn absorb(&mut self, other: EngineUpdate) {
        self.screen_changed |= other.screen_changed;
        self.cursor_moved |= other.cursor_moved;
        if other.keyboard_locked.is_some() {
            self.keyboard_locked = other.keyboard_locked;
        }
        self.alarm |= other.alarm;
        self.replies.extend(other.replies);
    }

    pub fn is_empty(&self) -> bool {
        *self == EngineUpdate::default()
    }
}

/// Terminal-display engine for one protocol dialect
///
/// Engines are owned by a single client and only ever called with the client's
/// session lock held, so they need not be internally synchronized.
pub trait TerminalEngine: Send {
    /// Dialect name, e.g. "TN5250"
    fn protocol_name(&self) -> &'static str;

    fn terminal_type(&self) -> TerminalType;

    /// Decode one complete host record (telnet framing already removed)
    fn process_record(&mut self, record: &[u8]) -> ProtocolResult<EngineUpdate>;

    /// Snapshot of the presentation space
    fn screen(&self) -> Screen;

    /// Cursor position, absent until the host first places it
    fn cursor(&self) -> Option<Position>;

    /// True while input is inhibited
    fn keyboard_locked(&self) -> bool;

    fn supports_key(&self, key: AttentionKey) -> bool;

    /// Overwrite the editable field starting at `start` with `value` and mark
    /// it modified. The value is cut to the field length.
    fn fill_field(&mut self, start: Position, value: &str) -> ProtocolResult<()>;

    /// Build the inbound record for `key` and lock the keyboard
    fn attention(&mut self, key: AttentionKey) -> ProtocolResult<Vec<u8>>;
}
