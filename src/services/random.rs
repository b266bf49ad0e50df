//! OS-backed randomness for tokens, backup codes and variant selection

use anyhow::{anyhow, Result};

pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::fill(&mut buf).map_err(|e| anyhow!("OS random source failed: {}", e))?;
    Ok(buf)
}

pub fn random_u64() -> Result<u64> {
    Ok(u64::from_le_bytes(random_bytes::<8>()?))
}

/// Lowercase hex token with `bytes` bytes of entropy
pub fn random_hex(bytes: usize) -> Result<String> {
    let mut buf = vec![0u8; bytes];
    getrandom::fill(&mut buf).map_err(|e| anyhow!("OS random source failed: {}", e))?;
    Ok(data_encoding::HEXLOWER.encode(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_hex_length_and_uniqueness() {
        let a = random_hex(32).unwrap();
        let b = random_hex(32).unwrap();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
