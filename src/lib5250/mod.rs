//! TN5250 dialect
//!
//! [`Tn5250Engine`] turns 5250 data stream records into a presentation space
//! and builds the inbound records for operator actions.

pub mod codes;
pub mod field;
pub mod session;

pub use session::Tn5250Engine;
