//! Input validation for PromptLab
//!
//! Provides validation for:
//! - Numeric resource identifiers taken from URL path segments
//! - ID lists submitted in request bodies
//! - Resource names
//! - Pagination windows

use crate::{PromptLabError, Result};
use serde_json::Value;

/// Maximum length for project, dataset and prompt names
pub const MAX_NAME_LEN: usize = 255;

/// Default page size for paginated listings
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Maximum page size for paginated listings
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Parse a single path segment as a positive base-10 identifier.
///
/// Only ASCII digits are accepted (no sign, whitespace or radix prefix).
/// Returns `None` for empty input, overflow, or values <= 0.
pub fn parse_resource_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Join identifier roles the way error messages name them.
///
/// `["project ID"]` → `project ID`,
/// `["project ID", "dataset ID"]` → `project ID or dataset ID`,
/// `["project ID", "prompt ID", "version"]` → `project ID, prompt ID or version`.
pub fn describe_roles(roles: &[&str]) -> String {
    match roles {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}

/// Parse all identifiers of a route together.
///
/// Each segment is `(role, raw)`. If any segment is invalid the whole call
/// fails with one message naming every role, e.g.
/// `Invalid project ID or dataset ID`.
pub fn parse_ids<const N: usize>(segments: [(&str, &str); N]) -> Result<[i64; N]> {
    let mut ids = [0i64; N];
    for (slot, (_, raw)) in ids.iter_mut().zip(segments.iter()) {
        match parse_resource_id(raw) {
            Some(id) => *slot = id,
            None => {
                let roles: Vec<&str> = segments.iter().map(|(role, _)| *role).collect();
                return Err(PromptLabError::InvalidParameter(format!(
                    "Invalid {}",
                    describe_roles(&roles)
                )));
            }
        }
    }
    Ok(ids)
}

/// Keep only the integer entries of a JSON array of IDs.
///
/// Strings, nulls, booleans, objects and fractional numbers are dropped, as
/// are integers outside the `i64` range. Whole-valued floats such as `2.0`
/// count as integers.
pub fn filter_integer_ids(values: &[Value]) -> Vec<i64> {
    values
        .iter()
        .filter_map(|value| match value {
            Value::Number(n) if n.is_u64() || n.is_i64() => n.as_i64(),
            Value::Number(n) => n.as_f64().and_then(whole_to_i64),
            _ => None,
        })
        .collect()
}

/// `f` as an `i64` when it is finite, whole and inside the `i64` range.
///
/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
pub(crate) fn whole_to_i64(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// Validate a resource name
///
/// Requirements:
/// - Not empty after trimming
/// - <= 255 characters
/// - No control characters
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PromptLabError::ValidationError(format!(
            "{} is required",
            field_name
        )));
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(PromptLabError::ValidationError(format!(
            "{} too long: {} > {} characters",
            field_name,
            name.chars().count(),
            MAX_NAME_LEN
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(PromptLabError::ValidationError(format!(
            "{} contains control characters",
            field_name
        )));
    }

    Ok(())
}

/// Validate and default a pagination window.
///
/// `limit` must be in `1..=100` (default 50); `offset` must be `>= 0` (default 0).
pub fn validate_page(limit: Option<&str>, offset: Option<&str>) -> Result<(i64, i64)> {
    let invalid = || PromptLabError::InvalidParameter("Invalid pagination parameters".to_string());

    let limit = match limit {
        Some(raw) => raw.parse::<i64>().map_err(|_| invalid())?,
        None => DEFAULT_PAGE_LIMIT,
    };
    let offset = match offset {
        Some(raw) => raw.parse::<i64>().map_err(|_| invalid())?,
        None => 0,
    };

    if !(1..=MAX_PAGE_LIMIT).contains(&limit) || offset < 0 {
        return Err(invalid());
    }

    Ok((limit, offset))
}
