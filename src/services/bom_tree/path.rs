//! Display paths and export folder names.
//!
//! Two concatenation rules share the same shape but never the separator: the
//! display path joins position codes with `.`, the export folder joins
//! segments with `/`.

use crate::errors::ServiceError;

pub const DISPLAY_SEPARATOR: char = '.';
pub const FOLDER_SEPARATOR: char = '/';

/// `prefix.position_code`, or the bare code at the top of a tree.
pub fn display_position_code(prefix: Option<&str>, position_code: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            format!("{}{}{}", prefix, DISPLAY_SEPARATOR, position_code)
        }
        _ => position_code.to_string(),
    }
}

/// Longest position code a line can store.
pub const MAX_POSITION_CODE_LEN: usize = 64;

/// Trims every segment of a display path, so `" 1 . A"` becomes `"1.A"`.
///
/// Empty segments (`"1..A"`, `".1"`, `"1."`) break the parent chain and are
/// rejected.
pub fn normalize_display_position_code(path: &str) -> Result<String, ServiceError> {
    let segments: Vec<&str> = path.split(DISPLAY_SEPARATOR).map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ServiceError::IntegrityError(format!(
            "position path '{}' contains an empty segment",
            path.trim()
        )));
    }
    Ok(segments.join(&DISPLAY_SEPARATOR.to_string()))
}

/// Splits a normalized display path into its parent prefix and its own
/// position code. Paths with empty or padded segments are rejected; run them
/// through [`normalize_display_position_code`] first.
pub fn split_display_position_code(path: &str) -> Result<(Option<&str>, &str), ServiceError> {
    if path.split(DISPLAY_SEPARATOR).any(|s| s.is_empty() || s.trim() != s) {
        return Err(ServiceError::IntegrityError(format!(
            "position path '{}' is not normalized",
            path
        )));
    }

    Ok(match path.rfind(DISPLAY_SEPARATOR) {
        Some(idx) => (Some(&path[..idx]), &path[idx + 1..]),
        None => (None, path),
    })
}

/// Trailing `_`-separated token of a version code: `V1.0` for `M2_V1.0`.
pub fn version_suffix(version_code: &str) -> Option<&str> {
    version_code
        .rsplit_once('_')
        .map(|(_, suffix)| suffix)
        .filter(|suffix| !suffix.is_empty())
}

/// Version code for a material: `<material_code>_V<suffix>`.
pub fn version_code(material_code: &str, suffix: &str) -> String {
    let suffix = suffix.trim_start_matches(['V', 'v']);
    format!("{}_V{}", material_code, suffix)
}

/// Folder segment for a line: `<position_code>_<component_code>[_<version_suffix>]`.
pub fn folder_segment(
    position_code: &str,
    component_code: &str,
    version_suffix: Option<&str>,
) -> String {
    match version_suffix {
        Some(suffix) => format!("{}_{}_{}", position_code, component_code, suffix),
        None => format!("{}_{}", position_code, component_code),
    }
}

pub fn join_folder(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!(
            "{}{}{}",
            parent.trim_end_matches(FOLDER_SEPARATOR),
            FOLDER_SEPARATOR,
            segment
        )
    }
}
