//! Utility functions for the MFA service.

/// One-time code generation.
pub mod code {
    use rand::Rng;

    const DIGITS: &[u8] = b"0123456789";
    const ALPHANUMERIC: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    /// Generate a numeric one-time code.
    ///
    /// Draws uniformly from `0-9` using the thread-local CSPRNG.
    pub fn generate_numeric(length: usize) -> String {
        let mut rng = rand::rng();
        (0..length)
            .map(|_| DIGITS[rng.random_range(0..DIGITS.len())] as char)
            .collect()
    }

    /// Generate an alphanumeric one-time code.
    ///
    /// Draws uniformly from `0-9A-Z` using the thread-local CSPRNG.
    pub fn generate_alphanumeric(length: usize) -> String {
        let mut rng = rand::rng();
        (0..length)
            .map(|_| ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())] as char)
            .collect()
    }
}

/// Cryptographic utilities.
pub mod crypto {
    /// Generate a secure random byte array.
    pub fn generate_random_bytes(length: usize) -> Vec<u8> {
        use rand::RngCore;
        let mut bytes = vec![0u8; length];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Constant-time string comparison.
    pub fn constant_time_eq(a: &str, b: &str) -> bool {
        if a.len() != b.len() {
            return false;
        }

        let mut result = 0u8;
        for (byte_a, byte_b) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
            result |= byte_a ^ byte_b;
        }
        result == 0
    }
}

/// String utilities.
pub mod string {
    /// Redact a one-time code for logging.
    ///
    /// Codes never appear in logs in the clear; only the masked placeholder.
    pub fn mask_code(code: &str) -> String {
        "*".repeat(code.len().min(8))
    }
}

/// Time utilities.
pub mod time {
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Get current Unix timestamp.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_code_shape() {
        let code = code::generate_numeric(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_alphanumeric_code_shape() {
        let code = code::generate_alphanumeric(8);
        assert_eq!(code.len(), 8);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_code_uniqueness() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let code = code::generate_alphanumeric(8);
            assert!(seen.insert(code), "generated duplicate code");
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(crypto::constant_time_eq("123456", "123456"));
        assert!(!crypto::constant_time_eq("123456", "123457"));
        assert!(!crypto::constant_time_eq("123456", "12345"));
        assert!(crypto::constant_time_eq("", ""));
    }

    #[test]
    fn test_mask_code() {
        assert_eq!(string::mask_code("123456"), "******");
        assert!(!string::mask_code("8675309").contains('8'));
    }
}
