//! Common Telnet protocol functionality for TN5250 and TN3270
//!
//! Command and option codes, builders for negotiation sequences, record
//! framing, and a streaming decoder that splits the inbound byte stream into
//! negotiations, subnegotiations and `IAC EOR` terminated records.

/// Telnet command codes (RFC 854, RFC 885)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetCommand {
    /// Interpret As Command - 255 (0xFF)
    IAC = 255,
    /// Don't - 254 (0xFE)
    DONT = 254,
    /// Do - 253 (0xFD)
    DO = 253,
    /// Won't - 252 (0xFC)
    WONT = 252,
    /// Will - 251 (0xFB)
    WILL = 251,
    /// Subnegotiation Begin - 250 (0xFA)
    SB = 250,
    /// No Operation - 241 (0xF1)
    NOP = 241,
    /// Subnegotiation End - 240 (0xF0)
    SE = 240,
    /// End of Record - 239 (0xEF)
    EOR = 239,
}

impl TelnetCommand {
    /// Convert a byte to a TelnetCommand
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            255 => Some(TelnetCommand::IAC),
            254 => Some(TelnetCommand::DONT),
            253 => Some(TelnetCommand::DO),
            252 => Some(TelnetCommand::WONT),
            251 => Some(TelnetCommand::WILL),
            250 => Some(TelnetCommand::SB),
            241 => Some(TelnetCommand::NOP),
            240 => Some(TelnetCommand::SE),
            239 => Some(TelnetCommand::EOR),
            _ => None,
        }
    }

    /// WILL, WONT, DO or DONT
    pub fn is_negotiation(&self) -> bool {
        matches!(
            self,
            TelnetCommand::WILL | TelnetCommand::WONT | TelnetCommand::DO | TelnetCommand::DONT
        )
    }
}

/// Telnet options used by the 3270 and 5250 dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Binary Transmission - 0
    Binary = 0,
    /// Terminal Type - 24
    TerminalType = 24,
    /// End of Record - 25
    EndOfRecord = 25,
    /// New Environment - 39
    NewEnvironment = 39,
    /// TN3270E - 40
    TN3270E = 40,
}

impl TelnetOption {
    /// Convert a byte to a TelnetOption
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TelnetOption::Binary),
            24 => Some(TelnetOption::TerminalType),
            25 => Some(TelnetOption::EndOfRecord),
            39 => Some(TelnetOption::NewEnvironment),
            40 => Some(TelnetOption::TN3270E),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TelnetOption::Binary => "Binary",
            TelnetOption::TerminalType => "Terminal Type",
            TelnetOption::EndOfRecord => "End of Record",
            TelnetOption::NewEnvironment => "New Environment",
            TelnetOption::TN3270E => "TN3270E",
        }
    }
}

/// TERMINAL-TYPE subnegotiation verbs (RFC 1091)
pub const TERMINAL_TYPE_IS: u8 = 0;
pub const TERMINAL_TYPE_SEND: u8 = 1;

/// Telnet negotiation state for one side of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Disabled,
    Enabled,
}

/// Both sides of an option
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionState {
    /// Our side (WILL / WONT)
    pub local: NegotiationState,
    /// Their side (DO / DONT)
    pub remote: NegotiationState,
}

impl OptionState {
    /// Check if the option is enabled on both sides
    pub fn is_enabled(&self) -> bool {
        self.local == NegotiationState::Enabled && self.remote == NegotiationState::Enabled
    }
}

/// Build a telnet negotiation sequence
///
/// ```
/// use rte_client::protocol_common::telnet_base::{build_negotiation, TelnetCommand};
///
/// // "IAC WILL BINARY"
/// assert_eq!(build_negotiation(TelnetCommand::WILL, 0), vec![255, 251, 0]);
/// ```
pub fn build_negotiation(command: TelnetCommand, option: u8) -> Vec<u8> {
    vec![TelnetCommand::IAC as u8, command as u8, option]
}

/// Build a telnet subnegotiation sequence, doubling IAC bytes in `data`
pub fn build_subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut result = vec![TelnetCommand::IAC as u8, TelnetCommand::SB as u8, option];
    push_escaped(&mut result, data);
    result.push(TelnetCommand::IAC as u8);
    result.push(TelnetCommand::SE as u8);
    result
}

/// Frame one data stream record for the wire: IAC doubled, `IAC EOR` appended
pub fn frame_record(record: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(record.len() + 2);
    push_escaped(&mut framed, record);
    framed.push(TelnetCommand::IAC as u8);
    framed.push(TelnetCommand::EOR as u8);
    framed
}

fn push_escaped(out: &mut Vec<u8>, data: &[u8]) {
    for &byte in data {
        out.push(byte);
        if byte == TelnetCommand::IAC as u8 {
            out.push(TelnetCommand::IAC as u8);
        }
    }
}

/// Something the decoder found in the inbound stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    Negotiation { command: TelnetCommand, option: u8 },
    Subnegotiation { option: u8, data: Vec<u8> },
    /// A complete record, IAC escapes removed
    Record(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Data,
    Iac,
    Negotiate(TelnetCommand),
    SubOption,
    SubData,
    SubIac,
}

/// Streaming telnet decoder
///
/// Bytes may arrive split anywhere; state carries over between calls to
/// [`TelnetDecoder::feed`].
#[derive(Debug)]
pub struct TelnetDecoder {
    state: DecoderState,
    record: Vec<u8>,
    sub_option: u8,
    sub_data: Vec<u8>,
}

impl Default for TelnetDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Data,
            record: Vec::new(),
            sub_option: 0,
            sub_data: Vec::new(),
        }
    }

    /// Bytes of the record being assembled
    pub fn pending(&self) -> usize {
        self.record.len()
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<TelnetEvent> {
        const IAC: u8 = TelnetCommand::IAC as u8;
        let mut events = Vec::new();
        for &byte in data {
            self.state = match self.state {
                DecoderState::Data if byte == IAC => DecoderState::Iac,
                DecoderState::Data => {
                    self.record.push(byte);
                    DecoderState::Data
                }
                DecoderState::Iac => match TelnetCommand::from_u8(byte) {
                    Some(TelnetCommand::IAC) => {
                        self.record.push(IAC);
                        DecoderState::Data
                    }
                    Some(TelnetCommand::EOR) => {
                        events.push(TelnetEvent::Record(std::mem::take(&mut self.record)));
                        DecoderState::Data
                    }
                    Some(TelnetCommand::SB) => DecoderState::SubOption,
                    Some(command) if command.is_negotiation() => DecoderState::Negotiate(command),
                    // NOP, stray SE and commands we have no use for
                    _ => DecoderState::Data,
                },
                DecoderState::Negotiate(command) => {
                    events.push(TelnetEvent::Negotiation { command, option: byte });
                    DecoderState::Data
                }
                DecoderState::SubOption => {
                    self.sub_option = byte;
                    self.sub_data.clear();
                    DecoderState::SubData
                }
                DecoderState::SubData if byte == IAC => DecoderState::SubIac,
                DecoderState::SubData => {
                    self.sub_data.push(byte);
                    DecoderState::SubData
                }
                DecoderState::SubIac if byte == TelnetCommand::SE as u8 => {
                    events.push(TelnetEvent::Subnegotiation {
                        option: self.sub_option,
                        data: std::mem::take(&mut self.sub_data),
                    });
                    DecoderState::Data
                }
                DecoderState::SubIac => {
                    self.sub_data.push(byte);
                    DecoderState::SubData
                }
            };
        }
        events
    }
}
