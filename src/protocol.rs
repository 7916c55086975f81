//! Protocol dialects, terminal types and transport security
//!
//! The client speaks one dialect per session. Each dialect advertises the
//! terminal models it can emulate; the model decides the screen geometry and
//! the TERMINAL-TYPE string sent during telnet negotiation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::lib3270::Tn3270Engine;
use crate::lib5250::Tn5250Engine;
use crate::protocol_common::TerminalEngine;

/// Terminal protocol dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// IBM 5250 for IBM i (AS/400) systems
    Tn5250,
    /// IBM 3270 for mainframe systems
    Tn3270,
}

/// Transport security for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SecurityMode {
    #[default]
    None,
    Tls,
}

/// An emulated terminal model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalType {
    /// TERMINAL-TYPE string, e.g. "IBM-3179-2"
    pub id: &'static str,
    /// Screen size after a plain clear / erase write
    pub rows: usize,
    pub columns: usize,
    /// Alternate screen size (27x132 capable 5250 models, 3270 models 3-5)
    pub alternate_rows: usize,
    pub alternate_columns: usize,
}

impl TerminalType {
    const fn new(id: &'static str, alternate_rows: usize, alternate_columns: usize) -> Self {
        Self {
            id,
            rows: 24,
            columns: 80,
            alternate_rows,
            alternate_columns,
        }
    }

    /// Model with its default screen size equal to its alternate size
    const fn fixed(id: &'static str, rows: usize, columns: usize) -> Self {
        Self {
            id,
            rows,
            columns,
            alternate_rows: rows,
            alternate_columns: columns,
        }
    }
}

impl fmt::Display for TerminalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.id, self.alternate_rows, self.alternate_columns)
    }
}

const TN5250_TERMINAL_TYPES: &[TerminalType] = &[
    TerminalType::new("IBM-3179-2", 24, 80),
    TerminalType::new("IBM-3180-2", 27, 132),
    TerminalType::new("IBM-3196-A1", 24, 80),
    TerminalType::new("IBM-3477-FC", 27, 132),
    TerminalType::new("IBM-3477-FG", 27, 132),
    TerminalType::new("IBM-5251-11", 24, 80),
    TerminalType::new("IBM-5291-1", 24, 80),
    TerminalType::new("IBM-5292-2", 24, 80),
];

// 3270 models 3-5 start out in their alternate size on Erase Write Alternate
// only; the default partition is always 24x80.
const TN3270_TERMINAL_TYPES: &[TerminalType] = &[
    TerminalType::fixed("IBM-3278-2", 24, 80),
    TerminalType::fixed("IBM-3278-2-E", 24, 80),
    TerminalType::new("IBM-3278-3", 32, 80),
    TerminalType::new("IBM-3278-4", 43, 80),
    TerminalType::new("IBM-3278-5", 27, 132),
];

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Tn5250 => "TN5250",
            Protocol::Tn3270 => "TN3270",
        }
    }

    pub fn supported_terminal_types(&self) -> &'static [TerminalType] {
        match self {
            Protocol::Tn5250 => TN5250_TERMINAL_TYPES,
            Protocol::Tn3270 => TN3270_TERMINAL_TYPES,
        }
    }

    pub fn default_terminal_type(&self) -> TerminalType {
        self.supported_terminal_types()[0]
    }

    /// Look up a terminal type by its TERMINAL-TYPE id, case-insensitively
    pub fn terminal_type_by_id(&self, id: &str) -> Option<TerminalType> {
        self.supported_terminal_types()
            .iter()
            .find(|terminal_type| terminal_type.id.eq_ignore_ascii_case(id.trim()))
            .copied()
    }

    /// Fresh terminal-display engine for a new session
    pub fn create_engine(&self, terminal_type: TerminalType) -> Box<dyn TerminalEngine> {
        match self {
            Protocol::Tn5250 => Box::new(Tn5250Engine::new(terminal_type)),
            Protocol::Tn3270 => Box::new(Tn3270Engine::new(terminal_type)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TN5250" | "5250" => Ok(Protocol::Tn5250),
            "TN3270" | "3270" => Ok(Protocol::Tn3270),
            other => Err(format!("Unknown protocol '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_terminal_types() {
        assert_eq!(Protocol::Tn5250.default_terminal_type().id, "IBM-3179-2");
        assert_eq!(Protocol::Tn3270.default_terminal_type().id, "IBM-3278-2");
    }

    #[test]
    fn test_terminal_type_lookup() {
        let wide = Protocol::Tn5250.terminal_type_by_id("ibm-3477-fc").unwrap();
        assert_eq!((wide.rows, wide.columns), (24, 80));
        assert_eq!((wide.alternate_rows, wide.alternate_columns), (27, 132));

        let model4 = Protocol::Tn3270.terminal_type_by_id("IBM-3278-4").unwrap();
        assert_eq!((model4.alternate_rows, model4.alternate_columns), (43, 80));

        assert!(Protocol::Tn3270.terminal_type_by_id("IBM-3477-FC").is_none());
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("tn5250".parse::<Protocol>().unwrap(), Protocol::Tn5250);
        assert_eq!("3270".parse::<Protocol>().unwrap(), Protocol::Tn3270);
        assert!("vt420".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_create_engine_matches_protocol() {
        let engine = Protocol::Tn3270.create_engine(Protocol::Tn3270.default_terminal_type());
        assert_eq!(engine.protocol_name(), "TN3270");
        assert_eq!(engine.terminal_type().id, "IBM-3278-2");
    }
}
