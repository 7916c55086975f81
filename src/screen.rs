//! Read-only screen snapshots
//!
//! A [`Screen`] is what the protocol engines hand to the rest of the client:
//! decoded characters plus the field layout. Snapshots are immutable, so a
//! waiter evaluating a condition always sees the state that accompanied the
//! notification it is handling.

use std::fmt;

use crate::error::ScreenError;
use crate::position::{Area, Position};

/// Characters stripped from the end of a label candidate
const LABEL_FILLER: &[char] = &['.', ':', ' '];

/// A field of the presentation space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// First data cell (the attribute cell precedes it)
    pub start: Position,
    pub length: usize,
    pub protected: bool,
    pub hidden: bool,
    pub numeric: bool,
    pub modified: bool,
    /// Field data as text, trailing nulls removed
    pub content: String,
}

impl Field {
    pub fn is_editable(&self) -> bool {
        !self.protected
    }

    fn start_offset(&self, columns: usize) -> usize {
        (self.start.row - 1) * columns + (self.start.column - 1)
    }

    /// True when `offset` lies within this field's data cells; fields may wrap
    /// past the end of the buffer
    fn covers(&self, offset: usize, columns: usize, size: usize) -> bool {
        let start = self.start_offset(columns);
        (offset + size - start) % size < self.length
    }
}

/// Snapshot of the presentation space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    rows: usize,
    columns: usize,
    cells: Vec<char>,
    fields: Vec<Field>,
}

impl Screen {
    /// Blank screen with no fields
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: vec![' '; rows * columns],
            fields: Vec::new(),
        }
    }

    /// Build a snapshot from decoded cells; `cells` is padded or cut to size
    pub fn from_parts(rows: usize, columns: usize, mut cells: Vec<char>, fields: Vec<Field>) -> Self {
        cells.resize(rows * columns, ' ');
        Self { rows, columns, cells, fields }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn cell(&self, position: Position) -> Option<char> {
        position
            .to_offset(self.rows, self.columns)
            .and_then(|offset| self.cells.get(offset).copied())
    }

    /// One row of text, 1-based
    pub fn row_text(&self, row: usize) -> Option<String> {
        if row == 0 || row > self.rows {
            return None;
        }
        let start = (row - 1) * self.columns;
        Some(self.cells[start..start + self.columns].iter().collect())
    }

    /// Whole screen, rows joined with `'\n'`
    pub fn text(&self) -> String {
        self.cells
            .chunks(self.columns.max(1))
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text inside `area`, rows joined with `'\n'`
    pub fn text_in(&self, area: &Area) -> Result<String, ScreenError> {
        let resolved = area.resolve(self.rows, self.columns)?;
        let lines: Vec<String> = (resolved.top..=resolved.bottom)
            .map(|row| {
                let base = (row - 1) * self.columns;
                self.cells[base + resolved.left - 1..base + resolved.right]
                    .iter()
                    .collect()
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Editable field whose data cells include `position`
    pub fn editable_field_at(&self, position: Position) -> Option<&Field> {
        let offset = position.to_offset(self.rows, self.columns)?;
        let size = self.cells.len();
        self.fields
            .iter()
            .filter(|field| field.is_editable())
            .find(|field| field.covers(offset, self.columns, size))
    }

    /// Editable field introduced by `label`.
    ///
    /// A protected field whose text, with leader dots, colons and blanks
    /// trimmed from its end, equals the label introduces the first editable
    /// field after it in buffer order. Screens that paint labels as plain text
    /// fall back to the label candidate of each editable field: the text on
    /// the same row between the previous editable field (or the row start) and
    /// the field's attribute cell. There a label matches either the whole
    /// candidate or its last blank-separated column, so "User" finds the field
    /// after `Sign on   User  . . . . .`.
    pub fn field_for_label(&self, label: &str) -> Option<&Field> {
        let wanted = label.trim();
        if wanted.is_empty() {
            return None;
        }
        self.field_after_protected_label(wanted)
            .or_else(|| self.field_by_leader_text(wanted))
    }

    fn field_after_protected_label(&self, wanted: &str) -> Option<&Field> {
        let mut ordered: Vec<&Field> = self.fields.iter().collect();
        ordered.sort_by_key(|field| field.start_offset(self.columns));
        let index = ordered.iter().position(|field| {
            field.protected && self.field_text(field).trim_end_matches(LABEL_FILLER).trim() == wanted
        })?;
        ordered[index + 1..].iter().copied().find(|field| field.is_editable())
    }

    /// Cells of `field`, wrapping past the end of the buffer
    fn field_text(&self, field: &Field) -> String {
        let size = self.cells.len();
        if size == 0 {
            return String::new();
        }
        let start = field.start_offset(self.columns);
        (0..field.length.min(size))
            .map(|i| self.cells[(start + i) % size])
            .collect()
    }

    fn field_by_leader_text(&self, wanted: &str) -> Option<&Field> {
        self.fields
            .iter()
            .filter(|field| field.is_editable())
            .find(|field| {
                let candidate = self.label_candidate(field);
                let trimmed = candidate.trim_end_matches(LABEL_FILLER).trim();
                if trimmed == wanted {
                    return true;
                }
                trimmed
                    .rsplit("  ")
                    .find(|chunk| !chunk.trim().is_empty())
                    .map(|chunk| chunk.trim() == wanted)
                    .unwrap_or(false)
            })
    }

    fn label_candidate(&self, field: &Field) -> String {
        let size = self.cells.len();
        let start = field.start_offset(self.columns);
        let row_start = start - start % self.columns;
        let mut collected = Vec::new();
        // Skip the attribute cell that precedes the field data
        let mut offset = start.saturating_sub(1);
        while offset > row_start {
            offset -= 1;
            let in_other_field = self
                .fields
                .iter()
                .any(|other| other.is_editable() && other.covers(offset, self.columns, size));
            if in_other_field {
                break;
            }
            collected.push(self.cells[offset]);
        }
        collected.iter().rev().collect()
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(cells: &mut [char], columns: usize, row: usize, column: usize, text: &str) {
        let start = (row - 1) * columns + column - 1;
        for (i, ch) in text.chars().enumerate() {
            cells[start + i] = ch;
        }
    }

    fn input_field(row: usize, column: usize, length: usize) -> Field {
        Field {
            start: Position::new(row, column),
            length,
            protected: false,
            hidden: false,
            numeric: false,
            modified: false,
            content: String::new(),
        }
    }

    fn sign_on_screen() -> Screen {
        let mut cells = vec![' '; 24 * 80];
        put(&mut cells, 80, 1, 36, "Sign On");
        put(&mut cells, 80, 6, 17, "User  . . . . . . . . . . . . . .");
        put(&mut cells, 80, 7, 17, "Password  . . . . . . . . . . . .");
        put(&mut cells, 80, 8, 17, "Program/procedure . . . . . . . .");
        let fields = vec![input_field(6, 53, 10), input_field(7, 53, 10), input_field(8, 53, 10)];
        Screen::from_parts(24, 80, cells, fields)
    }

    #[test]
    fn test_text_joins_rows() {
        let screen = Screen::from_parts(2, 3, "abcdef".chars().collect(), Vec::new());
        assert_eq!(screen.text(), "abc\ndef");
        assert_eq!(screen.row_text(2).as_deref(), Some("def"));
        assert_eq!(screen.row_text(3), None);
    }

    #[test]
    fn test_text_in_area() {
        let screen = sign_on_screen();
        let area = Area::from_top_left_bottom_right(1, 36, 1, 42);
        assert_eq!(screen.text_in(&area).unwrap(), "Sign On");

        let rows = Area::from_top_left_bottom_right(6, 17, 7, 20);
        assert_eq!(screen.text_in(&rows).unwrap(), "User\nPass");
    }

    #[test]
    fn test_text_in_area_outside_screen() {
        let screen = sign_on_screen();
        let area = Area::from_top_left_bottom_right(25, 1, 26, 10);
        assert!(screen.text_in(&area).is_err());
    }

    #[test]
    fn test_editable_field_at() {
        let screen = sign_on_screen();
        assert_eq!(screen.editable_field_at(Position::new(6, 53)).unwrap().start, Position::new(6, 53));
        assert_eq!(screen.editable_field_at(Position::new(6, 62)).unwrap().start, Position::new(6, 53));
        assert!(screen.editable_field_at(Position::new(6, 63)).is_none());
        assert!(screen.editable_field_at(Position::new(7, 1)).is_none());
    }

    #[test]
    fn test_field_for_label() {
        let screen = sign_on_screen();
        assert_eq!(screen.field_for_label("User").unwrap().start, Position::new(6, 53));
        assert_eq!(screen.field_for_label("Password").unwrap().start, Position::new(7, 53));
        assert_eq!(
            screen.field_for_label("Program/procedure").unwrap().start,
            Position::new(8, 53)
        );
        assert!(screen.field_for_label("Usr").is_none());
        assert!(screen.field_for_label("").is_none());
    }

    #[test]
    fn test_label_after_other_field_on_same_row() {
        let mut cells = vec![' '; 80];
        put(&mut cells, 80, 1, 1, "Userid ===>");
        put(&mut cells, 80, 1, 30, "Pass:");
        let fields = vec![input_field(1, 13, 8), input_field(1, 37, 8)];
        let screen = Screen::from_parts(1, 80, cells, fields);

        assert_eq!(screen.field_for_label("Pass").unwrap().start, Position::new(1, 37));
        assert_eq!(screen.field_for_label("Userid ===>").unwrap().start, Position::new(1, 13));
    }

    #[test]
    fn test_protected_label_above_its_input() {
        let mut cells = vec![' '; 24 * 80];
        put(&mut cells, 80, 1, 2, "Name:");
        put(&mut cells, 80, 3, 2, "Mail");
        let mut name = input_field(1, 2, 10);
        name.protected = true;
        let mut mail = input_field(3, 2, 4);
        mail.protected = true;
        // Layout order differs from buffer order on purpose
        let fields = vec![input_field(4, 2, 30), mail, input_field(2, 2, 30), name];
        let screen = Screen::from_parts(24, 80, cells, fields);

        assert_eq!(screen.field_for_label("Name").unwrap().start, Position::new(2, 2));
        assert_eq!(screen.field_for_label("Mail").unwrap().start, Position::new(4, 2));
    }

    #[test]
    fn test_protected_label_without_following_input() {
        let mut cells = vec![' '; 24 * 80];
        put(&mut cells, 80, 24, 2, "F3=Exit");
        let mut keys = input_field(24, 2, 20);
        keys.protected = true;
        let screen = Screen::from_parts(24, 80, cells, vec![input_field(2, 2, 10), keys]);
        assert!(screen.field_for_label("F3=Exit").is_none());
    }

    #[test]
    fn test_protected_fields_are_not_targets() {
        let mut field = input_field(3, 10, 5);
        field.protected = true;
        let screen = Screen::from_parts(24, 80, Vec::new(), vec![field]);
        assert!(screen.editable_field_at(Position::new(3, 10)).is_none());
    }
}
