//! Field validation rules for the portal

use crate::error::{PanelError, Result};

/// Usernames are 3-50 characters after trimming.
pub fn validate_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    if trimmed.chars().count() < 3 || trimmed.chars().count() > 50 {
        return Err(PanelError::validation(
            "username must be 3-50 characters",
        ));
    }
    Ok(trimmed.to_string())
}

/// Accepts `local@domain.tld` shapes up to 254 characters; rejects empty
/// input, missing or repeated `@`, whitespace, and dot-less domains.
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() || email.len() > 254 {
        return Err(PanelError::validation("invalid email address"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(PanelError::validation("invalid email address"));
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PanelError::validation("invalid email address"));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(PanelError::validation("invalid email address"));
    }
    // The domain needs at least one dot with non-empty labels around it.
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(PanelError::validation("invalid email address"));
    }
    Ok(())
}

/// Passwords are at least 8 characters with at least one letter and one
/// digit.
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(PanelError::validation(
            "password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(PanelError::validation(
            "password must contain at least one letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PanelError::validation(
            "password must contain at least one digit",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_trimmed_bounds() {
        assert_eq!(validate_username("  alice  ").unwrap(), "alice");
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"x".repeat(51)).is_err());
        assert!(validate_username(&"x".repeat(50)).is_ok());
    }

    #[test]
    fn test_email_accepts_plain_addresses() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.example.co").is_ok());
    }

    #[test]
    fn test_email_rejects_malformed() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at").is_err());
        assert!(validate_email("a@@b.com").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert!(validate_email("a@nodot").is_err());
        assert!(validate_email("a@.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email(&format!("{}@example.com", "x".repeat(250))).is_err());
    }

    #[test]
    fn test_password_rule() {
        assert!(validate_password("abcdefg1").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("12345678").is_err());
        // Unicode letters count toward length but the rule wants an ASCII
        // letter and digit present
        assert!(validate_password("pässword1").is_ok());
    }
}
