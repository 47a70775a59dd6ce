//! Opaque token generation

use glhub_core::domain::runner::RUNNER_TOKEN_PREFIX;
use rand::RngCore;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Runner authentication token: `glrt-` followed by 20 random bytes in hex
pub fn generate_runner_token() -> String {
    format!("{}{}", RUNNER_TOKEN_PREFIX, random_hex(20))
}

/// Job token: 16 random bytes in hex
pub fn generate_job_token() -> String {
    random_hex(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_token_shape() {
        let token = generate_runner_token();
        assert!(token.starts_with("glrt-"));
        assert_eq!(token.len(), 5 + 40);
        assert_ne!(token, generate_runner_token());
    }

    #[test]
    fn test_job_token_shape() {
        let token = generate_job_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
