//! Input validation for API requests.
//!
//! These checks run on the server for every request. The CLI client calls
//! the same functions before sending anything, mirroring the desktop form's
//! pre-flight checks; the service never trusts that the caller did.

use lazy_static::lazy_static;
use regex::Regex;

/// Minimum password length accepted at registration and password change.
pub const PASSWORD_MIN_LEN: usize = 6;

lazy_static! {
    /// Regex for validating usernames (alphanumeric with _ . -, 2-32 chars,
    /// starting alphanumeric)
    static ref USERNAME_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9][A-Za-z0-9_.-]{1,31}$"
    ).unwrap();

    /// Loose email shape check; delivery problems are the mail system's to report
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();
}

/// Validate a username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must be 2-32 characters: letters, digits, '_', '.' or '-', starting with a letter or digit"
                .to_string(),
        );
    }

    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate a new password against the length policy
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < PASSWORD_MIN_LEN {
        return Err(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN_LEN
        ));
    }

    Ok(())
}

/// Validate a password-change form: all fields present, confirmation
/// matches, length policy holds, and the password actually changes.
/// The same sequence the settings form runs before submitting.
pub fn validate_password_change(
    current: &str,
    new: &str,
    confirm: &str,
) -> Result<(), String> {
    if current.is_empty() || new.is_empty() || confirm.is_empty() {
        return Err("Please fill in all password fields".to_string());
    }

    if new != confirm {
        return Err("New passwords do not match".to_string());
    }

    if new.len() < PASSWORD_MIN_LEN {
        return Err(format!(
            "New password must be at least {} characters long",
            PASSWORD_MIN_LEN
        ));
    }

    if new == current {
        return Err("New password must be different from current password".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        for name in ["alice", "bob42", "j.doe", "a_b-c", "x0"] {
            assert!(validate_username(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_usernames() {
        for name in ["", "a", "_leading", ".dot", "has space", "ütf8", &"x".repeat(33)] {
            assert!(validate_username(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_email_shapes() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b+tag@sub.domain.io").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("no@tld").is_err());
        assert!(validate_email("spaces in@example.com").is_err());
    }

    #[test]
    fn test_password_length_policy() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_password_change_rules() {
        // Missing fields
        assert!(validate_password_change("", "newpass", "newpass").is_err());
        assert!(validate_password_change("old", "", "").is_err());

        // Confirmation mismatch
        assert_eq!(
            validate_password_change("old", "newpass", "other").unwrap_err(),
            "New passwords do not match"
        );

        // Too short
        assert!(validate_password_change("old", "12345", "12345").is_err());

        // Unchanged
        assert_eq!(
            validate_password_change("secret1", "secret1", "secret1").unwrap_err(),
            "New password must be different from current password"
        );

        // Valid
        assert!(validate_password_change("secret1", "secret2", "secret2").is_ok());
    }
}
