//! Wait condition descriptors
//!
//! Every condition carries an overall timeout, counted from the moment its
//! waiter starts, and a stable period the condition has to hold for before it
//! counts as met.

use std::fmt;

use regex::Regex;

use crate::position::{Area, Position};

/// Keyboard unlocked by the host: the host accepted the input and is ready
/// for the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWaitCondition {
    pub timeout_millis: u64,
    pub stable_timeout_millis: u64,
}

impl SyncWaitCondition {
    pub fn new(timeout_millis: u64, stable_timeout_millis: u64) -> Self {
        Self {
            timeout_millis,
            stable_timeout_millis,
        }
    }
}

/// No screen or cursor update for the whole stable period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilentWaitCondition {
    pub timeout_millis: u64,
    pub stable_timeout_millis: u64,
}

impl SilentWaitCondition {
    pub fn new(timeout_millis: u64, stable_timeout_millis: u64) -> Self {
        Self {
            timeout_millis,
            stable_timeout_millis,
        }
    }
}

/// Cursor resting at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorWaitCondition {
    pub position: Position,
    pub timeout_millis: u64,
    pub stable_timeout_millis: u64,
}

impl CursorWaitCondition {
    pub fn new(position: Position, timeout_millis: u64, stable_timeout_millis: u64) -> Self {
        Self {
            position,
            timeout_millis,
            stable_timeout_millis,
        }
    }
}

/// Screen text inside an area matching a regular expression
///
/// The area's rows are joined with `'\n'` before matching.
#[derive(Debug, Clone)]
pub struct TextWaitCondition {
    pub regex: Regex,
    pub area: Area,
    pub timeout_millis: u64,
    pub stable_timeout_millis: u64,
}

impl TextWaitCondition {
    pub fn new(regex: Regex, area: Area, timeout_millis: u64, stable_timeout_millis: u64) -> Self {
        Self {
            regex,
            area,
            timeout_millis,
            stable_timeout_millis,
        }
    }

    /// Compile `pattern` and build the condition
    pub fn from_pattern(
        pattern: &str,
        area: Area,
        timeout_millis: u64,
        stable_timeout_millis: u64,
    ) -> Result<Self, regex::Error> {
        Ok(Self::new(Regex::new(pattern)?, area, timeout_millis, stable_timeout_millis))
    }
}

/// A condition defined outside this crate
///
/// There is no waiter for it, so awaiting one fails with an unsupported
/// operation error. It exists for callers that build conditions from
/// configuration and want the failure reported by `await` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomWaitCondition {
    pub description: String,
    pub timeout_millis: u64,
    pub stable_timeout_millis: u64,
}

impl CustomWaitCondition {
    pub fn new(description: impl Into<String>, timeout_millis: u64, stable_timeout_millis: u64) -> Self {
        Self {
            description: description.into(),
            timeout_millis,
            stable_timeout_millis,
        }
    }
}

/// What `await` waits for
#[derive(Debug, Clone)]
pub enum WaitCondition {
    Sync(SyncWaitCondition),
    Silent(SilentWaitCondition),
    Cursor(CursorWaitCondition),
    Text(TextWaitCondition),
    Custom(CustomWaitCondition),
}

impl WaitCondition {
    pub fn timeout_millis(&self) -> u64 {
        match self {
            WaitCondition::Sync(c) => c.timeout_millis,
            WaitCondition::Silent(c) => c.timeout_millis,
            WaitCondition::Cursor(c) => c.timeout_millis,
            WaitCondition::Text(c) => c.timeout_millis,
            WaitCondition::Custom(c) => c.timeout_millis,
        }
    }

    pub fn stable_timeout_millis(&self) -> u64 {
        match self {
            WaitCondition::Sync(c) => c.stable_timeout_millis,
            WaitCondition::Silent(c) => c.stable_timeout_millis,
            WaitCondition::Cursor(c) => c.stable_timeout_millis,
            WaitCondition::Text(c) => c.stable_timeout_millis,
            WaitCondition::Custom(c) => c.stable_timeout_millis,
        }
    }

    pub fn description(&self) -> String {
        match self {
            WaitCondition::Sync(_) => "Emulator to be unlocked".to_string(),
            WaitCondition::Silent(_) => "Emulator screen to be silent".to_string(),
            WaitCondition::Cursor(c) => format!("Cursor to be placed in {}", c.position),
            WaitCondition::Text(c) => {
                format!("Emulator screen area {} to contain '{}'", c.area, c.regex.as_str())
            }
            WaitCondition::Custom(c) => c.description.clone(),
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (timeout {} ms, stable {} ms)",
            self.description(),
            self.timeout_millis(),
            self.stable_timeout_millis()
        )
    }
}

impl From<SyncWaitCondition> for WaitCondition {
    fn from(condition: SyncWaitCondition) -> Self {
        WaitCondition::Sync(condition)
    }
}

impl From<SilentWaitCondition> for WaitCondition {
    fn from(condition: SilentWaitCondition) -> Self {
        WaitCondition::Silent(condition)
    }
}

impl From<CursorWaitCondition> for WaitCondition {
    fn from(condition: CursorWaitCondition) -> Self {
        WaitCondition::Cursor(condition)
    }
}

impl From<TextWaitCondition> for WaitCondition {
    fn from(condition: TextWaitCondition) -> Self {
        WaitCondition::Text(condition)
    }
}

impl From<CustomWaitCondition> for WaitCondition {
    fn from(condition: CustomWaitCondition) -> Self {
        WaitCondition::Custom(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_per_variant() {
        let conditions: Vec<WaitCondition> = vec![
            SyncWaitCondition::new(100, 10).into(),
            SilentWaitCondition::new(200, 20).into(),
            CursorWaitCondition::new(Position::new(1, 1), 300, 30).into(),
            TextWaitCondition::from_pattern("READY", Area::default(), 400, 40)
                .unwrap()
                .into(),
            CustomWaitCondition::new("test", 500, 50).into(),
        ];
        let timeouts: Vec<(u64, u64)> = conditions
            .iter()
            .map(|c| (c.timeout_millis(), c.stable_timeout_millis()))
            .collect();
        assert_eq!(timeouts, vec![(100, 10), (200, 20), (300, 30), (400, 40), (500, 50)]);
    }

    #[test]
    fn test_descriptions() {
        let cursor: WaitCondition = CursorWaitCondition::new(Position::new(6, 53), 1, 1).into();
        assert_eq!(cursor.description(), "Cursor to be placed in (6, 53)");
        let custom: WaitCondition = CustomWaitCondition::new("test", 1, 1).into();
        assert_eq!(custom.description(), "test");
        assert!(cursor.to_string().contains("timeout 1 ms"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(TextWaitCondition::from_pattern("(", Area::default(), 1, 1).is_err());
    }
}
