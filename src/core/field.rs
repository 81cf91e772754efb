//! Fixed-column field extraction
//!
//! Every data line carries its identifier at the same character columns. The
//! field is opaque text: no numeric interpretation, exact case-sensitive match.

/// Inclusive, 1-indexed character range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

impl ColumnRange {
    /// Number of characters covered by the range
    pub const fn width(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Columns 6-23 hold the policy number in every data line
pub const POLICY_COLUMNS: ColumnRange = ColumnRange { start: 6, end: 23 };

/// Normalize an identifier: trim the ends and drop interior spaces
pub fn normalize_key(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != ' ').collect()
}

/// Extract and normalize the field at `range`.
///
/// Lines shorter than `range.end` characters have no field. Columns are counted
/// in characters so a replacement char from lossy decoding occupies one column.
pub fn extract_field(line: &str, range: ColumnRange) -> Option<String> {
    if line.chars().count() < range.end {
        return None;
    }

    let field: String = line
        .chars()
        .skip(range.start - 1)
        .take(range.width())
        .collect();

    Some(normalize_key(&field))
}
