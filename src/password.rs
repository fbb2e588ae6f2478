//! Password hashing is a pluggable primitive: the [`Store`] only needs something that turns a
//! plain text password into a stable string. [`Sha256Hasher`] is the default.
//!
//! [`Store`]: ../struct.Store.html
use sha2::{Digest, Sha256};

use crate::error::{MarketError, Result};

/// Turns a plain text password into the string that is stored and compared on login
pub trait PasswordHasher: Send + Sync + 'static {
    /// hashes `password`. The same input must always produce the same output.
    fn hash(&self, password: &str) -> String;
}

/// SHA-256 of the UTF-8 password bytes, rendered as lower case hex
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl PasswordHasher for Sha256Hasher {
    fn hash(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// compares two hashes without stopping at the first differing byte
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// A new password needs at least 8 characters, including an upper case letter, a lower case
/// letter and a digit
pub fn validate_strength(password: &str) -> Result<()> {
    let long_enough = password.chars().count() >= 8;
    let upper = password.chars().any(char::is_uppercase);
    let lower = password.chars().any(char::is_lowercase);
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if long_enough && upper && lower && digit {
        Ok(())
    } else {
        Err(MarketError::InvalidArgument(
            "Password must be at least 8 characters with upper case, lower case and a digit"
                .into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_digest() {
        assert_eq!(
            Sha256Hasher.hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn equal_and_unequal_hashes() {
        assert!(constant_time_eq("abcd", "abcd"));
        assert!(!constant_time_eq("abcd", "abce"));
        assert!(!constant_time_eq("abcd", "abc"));
    }

    #[test]
    fn strength_rules() {
        assert!(validate_strength("Passw0rd").is_ok());
        assert!(validate_strength("Admin123").is_ok());
        assert!(validate_strength("short1A").is_err());
        assert!(validate_strength("alllower1").is_err());
        assert!(validate_strength("ALLUPPER1").is_err());
        assert!(validate_strength("NoDigitsHere").is_err());
    }
}
