//! Attention keys
//!
//! An attention key is the protocol-level signal that hands the screen back to
//! the host. Each dialect encodes a different subset; the engines decide what
//! they support through [`crate::protocol_common::TerminalEngine::supports_key`].

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttentionKey {
    Enter,
    Attn,
    Clear,
    SysRq,
    Reset,
    RollUp,
    RollDn,
    Help,
    Print,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    F16,
    F17,
    F18,
    F19,
    F20,
    F21,
    F22,
    F23,
    F24,
    PA1,
    PA2,
    PA3,
}

const FUNCTION_KEYS: [AttentionKey; 24] = [
    AttentionKey::F1,
    AttentionKey::F2,
    AttentionKey::F3,
    AttentionKey::F4,
    AttentionKey::F5,
    AttentionKey::F6,
    AttentionKey::F7,
    AttentionKey::F8,
    AttentionKey::F9,
    AttentionKey::F10,
    AttentionKey::F11,
    AttentionKey::F12,
    AttentionKey::F13,
    AttentionKey::F14,
    AttentionKey::F15,
    AttentionKey::F16,
    AttentionKey::F17,
    AttentionKey::F18,
    AttentionKey::F19,
    AttentionKey::F20,
    AttentionKey::F21,
    AttentionKey::F22,
    AttentionKey::F23,
    AttentionKey::F24,
];

impl AttentionKey {
    /// Function key `F<number>`, 1 through 24
    pub fn function_key(number: u8) -> Option<Self> {
        if number == 0 {
            return None;
        }
        FUNCTION_KEYS.get(number as usize - 1).copied()
    }

    /// Function key number, if this is one of F1..F24
    pub fn function_number(&self) -> Option<u8> {
        FUNCTION_KEYS
            .iter()
            .position(|key| key == self)
            .map(|index| index as u8 + 1)
    }

    /// Program attention key number, if this is one of PA1..PA3
    pub fn program_attention_number(&self) -> Option<u8> {
        match self {
            AttentionKey::PA1 => Some(1),
            AttentionKey::PA2 => Some(2),
            AttentionKey::PA3 => Some(3),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            AttentionKey::Enter => "ENTER".to_string(),
            AttentionKey::Attn => "ATTN".to_string(),
            AttentionKey::Clear => "CLEAR".to_string(),
            AttentionKey::SysRq => "SYSRQ".to_string(),
            AttentionKey::Reset => "RESET".to_string(),
            AttentionKey::RollUp => "ROLL_UP".to_string(),
            AttentionKey::RollDn => "ROLL_DN".to_string(),
            AttentionKey::Help => "HELP".to_string(),
            AttentionKey::Print => "PRINT".to_string(),
            AttentionKey::PA1 | AttentionKey::PA2 | AttentionKey::PA3 => {
                format!("PA{}", self.program_attention_number().unwrap_or_default())
            }
            function => format!("F{}", function.function_number().unwrap_or_default()),
        }
    }
}

impl fmt::Display for AttentionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for AttentionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        let key = match upper.as_str() {
            "ENTER" => AttentionKey::Enter,
            "ATTN" => AttentionKey::Attn,
            "CLEAR" => AttentionKey::Clear,
            "SYSRQ" | "SYSREQ" => AttentionKey::SysRq,
            "RESET" => AttentionKey::Reset,
            "ROLL_UP" | "ROLLUP" | "PAGEDOWN" => AttentionKey::RollUp,
            "ROLL_DN" | "ROLLDN" | "ROLL_DOWN" | "PAGEUP" => AttentionKey::RollDn,
            "HELP" => AttentionKey::Help,
            "PRINT" => AttentionKey::Print,
            "PA1" => AttentionKey::PA1,
            "PA2" => AttentionKey::PA2,
            "PA3" => AttentionKey::PA3,
            other => {
                let number = other
                    .strip_prefix("PF")
                    .or_else(|| other.strip_prefix('F'))
                    .and_then(|n| n.parse::<u8>().ok());
                return number
                    .and_then(AttentionKey::function_key)
                    .ok_or_else(|| format!("Unknown attention key '{}'", s));
            }
        };
        Ok(key)
    }
}
