use sha2::{Digest, Sha256};

/// Derive a Matomo visitor id (`_id`): the first 8 bytes of SHA-256 as 16
/// lower-case hex chars.
///
/// The hash is unsalted and short; feed it a stable identifier such as a user
/// id, never a credential.
pub fn visitor_id(raw: &str) -> String {
    let hash = Sha256::digest(raw.as_bytes());
    hex::encode(&hash[..8])
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_id_is_sixteen_hex_chars() {
        let id = visitor_id("Bearer token123");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id, visitor_id("Bearer token123"));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(visitor_id("a"), visitor_id("b"));
    }

    #[test]
    fn known_digest_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(visitor_id("abc"), "ba7816bf8f01cfea");
    }
}
