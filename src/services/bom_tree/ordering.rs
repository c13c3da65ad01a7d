//! Ordering of sibling lines by position code.

use std::cmp::Ordering;

use crate::entities::bom_line;

/// Compares two position codes: shorter codes first, then lexicographic.
///
/// This keeps `"2"` ahead of `"10"` and approximates numeric-then-alphanumeric
/// ordering for mixed codes such as `"1"`, `"2"`, `"A"`, `"13KN"`.
pub fn cmp_position_codes(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Sibling order for lines; ties on position code fall back to line id so
/// the order is total and stable across loads.
pub fn cmp_lines(a: &bom_line::Model, b: &bom_line::Model) -> Ordering {
    cmp_position_codes(&a.position_code, &b.position_code).then_with(|| a.id.cmp(&b.id))
}

pub fn sort_lines(lines: &mut [bom_line::Model]) {
    lines.sort_by(cmp_lines);
}
