//! Input validation for values the operator types into the console.
//!
//! These checks keep blank or unbounded strings (zone names, URLs) from
//! reaching the server. Content is otherwise passed through as typed.

use anyhow::{anyhow, Result};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for URIs (RTSP, HTTP)
pub const MAX_URI_LENGTH: usize = 4096;

/// Maximum length for names (zone names, model weights)
pub const MAX_NAME_LENGTH: usize = 512;

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate name (zone name, weights file, etc.)
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    validate_non_empty(name, field_name)?;
    validate_length(name, MAX_NAME_LENGTH, field_name)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Loading dock", "zone name").is_ok());

        assert!(validate_name("", "zone name").is_err());
        assert!(validate_name("   ", "zone name").is_err());
        assert!(validate_name(&"z".repeat(600), "zone name").is_err());
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("rtsp://10.0.0.5:554/s?a=1&b=$x", MAX_URI_LENGTH, "rtsp_url").is_ok());
        assert!(validate_length(&"a".repeat(5000), MAX_URI_LENGTH, "rtsp_url").is_err());
    }
}
