use crate::{AddressError, AddressResult};

/// Minimum and maximum public handle length
const HANDLE_LEN: std::ops::RangeInclusive<usize> = 3..=32;

/// Returns true if `handle` is a syntactically valid public handle
///
/// Handles are ASCII letters, digits and underscores, must start with a
/// letter and cannot end with an underscore.
pub fn is_valid_handle(handle: &str) -> bool {
    HANDLE_LEN.contains(&handle.len())
        && handle.starts_with(|c: char| c.is_ascii_alphabetic())
        && !handle.ends_with('_')
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalizes a handle: strips a leading `@`, lowercases, validates
///
/// Handles are case-insensitive on the remote side, so two spellings of the
/// same handle map to a single channel key.
///
/// # Examples
///
/// ```
/// use channel_graph::address::canonical_handle;
///
/// assert_eq!(canonical_handle("@Rust_Lang").unwrap(), "rust_lang");
/// assert!(canonical_handle("1abc").is_err());
/// ```
pub fn canonical_handle(raw: &str) -> AddressResult<String> {
    let handle = raw.trim().trim_start_matches('@');
    if handle.is_empty() {
        return Err(AddressError::Empty);
    }
    if !is_valid_handle(handle) {
        return Err(AddressError::Malformed(format!(
            "invalid handle '{}'",
            handle
        )));
    }
    Ok(handle.to_ascii_lowercase())
}
