//! Common protocol functionality for TN5250 and TN3270
//!
//! - [`ebcdic`] - CP037 EBCDIC conversion
//! - [`reader`] - byte cursor used by the data stream decoders
//! - [`telnet_base`] - telnet codes, framing and the stream decoder
//! - [`traits`] - the [`TerminalEngine`] abstraction the client drives
//!
//! ```
//! use rte_client::protocol_common::ebcdic::{char_to_ebcdic, ebcdic_to_char};
//!
//! assert_eq!(ebcdic_to_char(0xC1), 'A');
//! assert_eq!(char_to_ebcdic('A'), 0xC1);
//! ```

pub mod ebcdic;
pub mod reader;
pub mod telnet_base;
pub mod traits;

pub use reader::RecordReader;
pub use telnet_base::{frame_record, TelnetDecoder, TelnetEvent};
pub use traits::{EngineUpdate, TerminalEngine};
