//! Serial number normalization.

/// Trim and upper-case a serial number. Blank input has no serial.
pub fn normalize_serial(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}
