//! Request fingerprints used as cache keys.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// base64(SHA-256) of the parts concatenated in order.
///
/// Parts are not delimited, so callers that need to keep adjacent parts apart
/// pass an explicit separator part (`"_"`).
pub fn compute_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // SHA-256("abc")
        assert_eq!(
            compute_fingerprint(&["abc"]),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
    }

    #[test]
    fn test_concatenation_order_matters() {
        assert_eq!(compute_fingerprint(&["a", "bc"]), compute_fingerprint(&["abc"]));
        assert_ne!(
            compute_fingerprint(&["[\"BTC\"]", "usd", "GECKOPRICE"]),
            compute_fingerprint(&["usd", "[\"BTC\"]", "GECKOPRICE"])
        );
    }

    #[test]
    fn test_tag_separates_functions() {
        assert_ne!(
            compute_fingerprint(&["\"BTC\"", "\"usd\"", "GECKOPRICE"]),
            compute_fingerprint(&["\"BTC\"", "\"usd\"", "GECKOPRICEBYNAME"])
        );
    }
}
