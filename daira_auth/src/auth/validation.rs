//! Registration and login input validation.

use super::errors::{AuthError, AuthResult};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const DISPLAY_NAME_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 254;

/// Trim and lowercase an email so case variants share one account and one
/// rate-limit counter
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate username: 3-30 characters of letters, digits or underscore
pub fn validate_username(username: &str) -> AuthResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "Username must be {}-{} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuthError::Validation(
            "Username can only contain letters, numbers, and underscores".to_string(),
        ));
    }

    Ok(())
}

/// Validate an already-normalized email address
pub fn validate_email(email: &str) -> AuthResult<()> {
    let invalid = || AuthError::Validation("Invalid email address".to_string());

    if email.is_empty() || email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid());
    };

    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels_ok = domain.contains('.') && domain.split('.').all(|label| !label.is_empty());
    if !labels_ok {
        return Err(invalid());
    }

    Ok(())
}

/// Validate password length
pub fn validate_password(password: &str) -> AuthResult<()> {
    let len = password.chars().count();

    if len < PASSWORD_MIN_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }

    if len > PASSWORD_MAX_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX_LEN
        )));
    }

    Ok(())
}

/// Validate an optional display name, defaulting to `username`
pub fn resolve_display_name(display_name: Option<&str>, username: &str) -> AuthResult<String> {
    match display_name.map(str::trim).filter(|name| !name.is_empty()) {
        None => Ok(username.to_string()),
        Some(name) if name.chars().count() > DISPLAY_NAME_MAX_LEN => Err(AuthError::Validation(
            format!("Display name must be at most {} characters", DISPLAY_NAME_MAX_LEN),
        )),
        Some(name) => Ok(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a_1").is_ok());
        assert!(validate_username(&"a".repeat(30)).is_ok());

        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
        assert!(validate_username("alice!").is_err());
        assert!(validate_username("al ice").is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.org").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a@x..com").is_err());
        assert!(validate_email("a@@x.com").is_err());
        assert!(validate_email("a b@x.com").is_err());
        assert!(validate_email(&format!("{}@x.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password(&"p".repeat(129)).is_err());
    }

    #[test]
    fn test_display_name_defaults_to_username() {
        assert_eq!(resolve_display_name(None, "alice").unwrap(), "alice");
        assert_eq!(resolve_display_name(Some("  "), "alice").unwrap(), "alice");
        assert_eq!(resolve_display_name(Some("Alice A."), "alice").unwrap(), "Alice A.");
        assert!(resolve_display_name(Some(&"x".repeat(101)), "alice").is_err());
    }
}
