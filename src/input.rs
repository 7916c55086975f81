//! Field inputs for [`crate::RteClient::send`]
//!
//! Inputs are resolved against the live field layout when they are sent; they
//! carry no field references of their own.

use crate::position::Position;

/// Value addressed by screen coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordInput {
    pub position: Position,
    pub value: String,
}

/// Value addressed by the label text shown before a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInput {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Coord(CoordInput),
    Label(LabelInput),
}

impl Input {
    pub fn coord(row: usize, column: usize, value: impl Into<String>) -> Self {
        Input::Coord(CoordInput {
            position: Position::new(row, column),
            value: value.into(),
        })
    }

    pub fn label(label: impl Into<String>, value: impl Into<String>) -> Self {
        Input::Label(LabelInput {
            label: label.into(),
            value: value.into(),
        })
    }

    pub fn value(&self) -> &str {
        match self {
            Input::Coord(input) => &input.value,
            Input::Label(input) => &input.value,
        }
    }
}

impl From<CoordInput> for Input {
    fn from(input: CoordInput) -> Self {
        Input::Coord(input)
    }
}

impl From<LabelInput> for Input {
    fn from(input: LabelInput) -> Self {
        Input::Label(input)
    }
}
