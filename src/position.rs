//! Screen coordinates and rectangular regions
//!
//! Rows and columns are 1-based, matching what terminal operators see on the
//! status line. [`Position::UNSPECIFIED_INDEX`] is only meaningful inside an
//! [`Area`], where it stands for "the screen edge".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScreenError;

/// A 1-based screen coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub column: usize,
}

impl Position {
    /// Sentinel for an area bound that follows the screen edge
    pub const UNSPECIFIED_INDEX: usize = 0;

    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Position of a 0-based buffer offset on a screen `columns` wide
    pub fn from_offset(offset: usize, columns: usize) -> Self {
        Self {
            row: offset / columns + 1,
            column: offset % columns + 1,
        }
    }

    /// 0-based buffer offset, or `None` when the position is unspecified or
    /// does not fit a `rows` x `columns` screen
    pub fn to_offset(&self, rows: usize, columns: usize) -> Option<usize> {
        if self.row == Self::UNSPECIFIED_INDEX || self.column == Self::UNSPECIFIED_INDEX {
            return None;
        }
        if self.row > rows || self.column > columns {
            return None;
        }
        Some((self.row - 1) * columns + (self.column - 1))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Rectangular screen region, bounds inclusive
///
/// Unspecified bounds are resolved against the screen dimensions each time the
/// area is evaluated, since the screen size may change between construction and
/// use (for example when a 5250 host switches to the 27x132 alternate size).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Area {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

/// An [`Area`] with every bound pinned to the current screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedArea {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Area {
    pub const fn from_top_left_bottom_right(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self { top, left, bottom, right }
    }

    /// Area spanning whatever screen is current when evaluated
    pub const fn full_screen() -> Self {
        Self::from_top_left_bottom_right(
            Position::UNSPECIFIED_INDEX,
            Position::UNSPECIFIED_INDEX,
            Position::UNSPECIFIED_INDEX,
            Position::UNSPECIFIED_INDEX,
        )
    }

    pub fn resolve(&self, rows: usize, columns: usize) -> Result<ResolvedArea, ScreenError> {
        let pick = |value: usize, edge: usize| {
            if value == Position::UNSPECIFIED_INDEX {
                edge
            } else {
                value
            }
        };
        let resolved = ResolvedArea {
            top: pick(self.top, 1),
            left: pick(self.left, 1),
            bottom: pick(self.bottom, rows),
            right: pick(self.right, columns),
        };

        if resolved.top > resolved.bottom
            || resolved.left > resolved.right
            || resolved.bottom > rows
            || resolved.right > columns
        {
            return Err(ScreenError::AreaOutOfBounds { area: *self, rows, columns });
        }
        Ok(resolved)
    }
}

impl Default for Area {
    fn default() -> Self {
        Self::full_screen()
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |value: usize| {
            if value == Position::UNSPECIFIED_INDEX {
                "*".to_string()
            } else {
                value.to_string()
            }
        };
        write!(
            f,
            "[({}, {}), ({}, {})]",
            bound(self.top),
            bound(self.left),
            bound(self.bottom),
            bound(self.right)
        )
    }
}
