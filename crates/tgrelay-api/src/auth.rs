//! Shared-password gate for write endpoints

use subtle::ConstantTimeEq;
use tgrelay_core::AppError;

/// Check a submitted `pwd` against the configured access password.
pub fn check_password(expected: &str, provided: Option<&str>) -> Result<(), AppError> {
    let provided = provided.unwrap_or_default();
    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Wrong password".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_password() {
        assert!(check_password("secret", Some("secret")).is_ok());
        assert!(check_password("secret", Some("Secret")).is_err());
        assert!(check_password("secret", Some("secret ")).is_err());
        assert!(check_password("secret", None).is_err());
    }
}
