//! Telnet Option Negotiation for TN3270 and TN5250
//!
//! Both dialects run over binary telnet with end-of-record framing and report
//! their terminal model through TERMINAL-TYPE (RFC 1091, RFC 1205, RFC 2877).
//! Anything else the host offers, TN3270E and NEW-ENVIRON included, is refused
//! so the session stays in plain record mode.

use std::collections::HashMap;

use log::debug;

use crate::protocol_common::telnet_base::{
    build_negotiation, build_subnegotiation, NegotiationState, OptionState, TelnetCommand,
    TelnetOption, TERMINAL_TYPE_IS, TERMINAL_TYPE_SEND,
};

/// Options we agree to on both sides
const ACCEPTED_OPTIONS: [TelnetOption; 3] = [
    TelnetOption::Binary,
    TelnetOption::EndOfRecord,
    TelnetOption::TerminalType,
];

#[derive(Debug)]
pub struct TelnetNegotiator {
    /// Current state of each option the host has mentioned
    option_states: HashMap<u8, OptionState>,
    /// Id sent in TERMINAL-TYPE IS
    terminal_type: String,
}

impl TelnetNegotiator {
    pub fn new(terminal_type: &str) -> Self {
        Self {
            option_states: HashMap::new(),
            terminal_type: terminal_type.to_string(),
        }
    }

    fn accepts(option: u8) -> bool {
        ACCEPTED_OPTIONS.iter().any(|accepted| *accepted as u8 == option)
    }

    fn state(&mut self, option: u8) -> &mut OptionState {
        self.option_states.entry(option).or_default()
    }

    /// True once binary, EOR and terminal type are agreed both ways
    pub fn is_negotiation_complete(&self) -> bool {
        ACCEPTED_OPTIONS.iter().all(|option| self.is_option_active(*option))
    }

    pub fn is_option_active(&self, option: TelnetOption) -> bool {
        self.option_states
            .get(&(option as u8))
            .map(OptionState::is_enabled)
            .unwrap_or(false)
    }

    /// Reply to WILL/WONT/DO/DONT. Only state changes are answered, which
    /// keeps a chatty host from starting a negotiation loop.
    pub fn handle_negotiation(&mut self, command: TelnetCommand, option: u8) -> Vec<u8> {
        let accepted = Self::accepts(option);
        let name = TelnetOption::from_u8(option).map(|o| o.name()).unwrap_or("unknown");
        debug!("telnet: received {:?} {} ({})", command, option, name);

        let state = self.state(option);
        match command {
            TelnetCommand::DO if !accepted => build_negotiation(TelnetCommand::WONT, option),
            TelnetCommand::DO => {
                if state.local == NegotiationState::Enabled {
                    return Vec::new();
                }
                state.local = NegotiationState::Enabled;
                build_negotiation(TelnetCommand::WILL, option)
            }
            TelnetCommand::WILL if !accepted => build_negotiation(TelnetCommand::DONT, option),
            TelnetCommand::WILL => {
                if state.remote == NegotiationState::Enabled {
                    return Vec::new();
                }
                state.remote = NegotiationState::Enabled;
                build_negotiation(TelnetCommand::DO, option)
            }
            TelnetCommand::DONT => {
                if state.local == NegotiationState::Disabled {
                    return Vec::new();
                }
                state.local = NegotiationState::Disabled;
                build_negotiation(TelnetCommand::WONT, option)
            }
            TelnetCommand::WONT => {
                if state.remote == NegotiationState::Disabled {
                    return Vec::new();
                }
                state.remote = NegotiationState::Disabled;
                build_negotiation(TelnetCommand::DONT, option)
            }
            _ => Vec::new(),
        }
    }

    /// Answer TERMINAL-TYPE SEND; every other subnegotiation is ignored
    pub fn handle_subnegotiation(&mut self, option: u8, data: &[u8]) -> Vec<u8> {
        if option == TelnetOption::TerminalType as u8 && data.first() == Some(&TERMINAL_TYPE_SEND) {
            debug!("telnet: sending terminal type {}", self.terminal_type);
            let mut payload = vec![TERMINAL_TYPE_IS];
            payload.extend_from_slice(self.terminal_type.as_bytes());
            return build_subnegotiation(option, &payload);
        }
        debug!("telnet: ignoring subnegotiation for option {}", option);
        Vec::new()
    }
}
