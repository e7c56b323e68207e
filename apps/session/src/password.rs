//! Local password policy, checked before any sign-up or password change
//! reaches the backend.

pub const MIN_PASSWORD_LEN: usize = 9;
const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// At least 9 characters with an uppercase letter, a lowercase letter,
/// a digit and one of `!@#$%^&*(),.?":{}|<>`.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| SPECIAL_CHARS.contains(c))
}
