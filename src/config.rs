//! Configuration and input validation
//!
//! Connection defaults and the string-level checks performed before any
//! network activity. Validation failures are reported to the caller, never
//! logged as system faults.

use crate::error::ValidationError;

/// Default relay host
pub const DEFAULT_HOST: &str = "localhost";

/// Default relay port
pub const DEFAULT_PORT: u16 = 8000;

/// Server-side routing policy
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Whether a group broadcast is echoed back to its sender.
    ///
    /// Off by default: the client session controller already appends
    /// outbound text locally, so an echo would duplicate it.
    pub echo_to_sender: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            echo_to_sender: false,
        }
    }
}

/// Parse and validate a port field
///
/// Accepts integers in `1..=65535`. Rejects empty, non-numeric, zero and
/// out-of-range input.
pub fn parse_port(text: &str) -> Result<u16, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPort);
    }
    match trimmed.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(ValidationError::InvalidPort),
    }
}

/// Validate a host field, returning the trimmed host
pub fn validate_host(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyHost);
    }
    Ok(trimmed)
}

/// Validate a display name, returning the trimmed name
pub fn validate_display_name(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_bounds() {
        assert_eq!(parse_port("1"), Ok(1));
        assert_eq!(parse_port("65535"), Ok(65535));
        assert_eq!(parse_port("8000"), Ok(8000));
    }

    #[test]
    fn test_port_rejections() {
        assert_eq!(parse_port(""), Err(ValidationError::EmptyPort));
        assert_eq!(parse_port("0"), Err(ValidationError::InvalidPort));
        assert_eq!(parse_port("65536"), Err(ValidationError::InvalidPort));
        assert_eq!(parse_port("-1"), Err(ValidationError::InvalidPort));
        assert_eq!(parse_port("abc"), Err(ValidationError::InvalidPort));
    }

    #[test]
    fn test_host_and_name_trimming() {
        assert_eq!(validate_host("  localhost "), Ok("localhost"));
        assert_eq!(validate_host("   "), Err(ValidationError::EmptyHost));
        assert_eq!(validate_display_name(" alice "), Ok("alice"));
        assert_eq!(validate_display_name(""), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_echo_default_off() {
        assert!(!ServerConfig::default().echo_to_sender);
    }
}
