//! IBM 3270 protocol (TN3270)
//!
//! 3270 is block oriented: the host writes into a buffer addressed by 12-bit
//! or 14-bit buffer addresses and reads back only what the operator changed.
//!
//! - [`codes`] - command codes, order codes, AIDs and attribute bits
//! - [`display`] - the presentation space and buffer addressing
//! - [`protocol`] - the [`Tn3270Engine`] data stream engine

pub mod codes;
pub mod display;
pub mod protocol;

pub use display::{Display3270, FieldSpan};
pub use protocol::Tn3270Engine;
