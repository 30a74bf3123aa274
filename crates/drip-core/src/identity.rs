//! Stable product identity derived from canonical URLs.

use sha2::{Digest, Sha256};

/// Length of the hex identifier kept as the document key.
pub const ID_HEX_LEN: usize = 16;

/// Deterministic short identifier for a product URL.
///
/// Truncating a cryptographic digest keeps keys short while making
/// collisions between distinct URLs statistically negligible.
pub fn product_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..ID_HEX_LEN / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_deterministic() {
        let a = product_id("https://example.com/products/gesha");
        let b = product_id("https://example.com/products/gesha");
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_HEX_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_urls_do_not_collide() {
        let mut seen = HashSet::new();
        for i in 0..5000 {
            let id = product_id(&format!("https://example.com/products/coffee-{i}"));
            assert!(seen.insert(id), "collision at url index {i}");
        }
    }

    #[test]
    fn id_depends_only_on_the_url() {
        assert_ne!(
            product_id("https://example.com/products/a"),
            product_id("https://example.com/products/b")
        );
    }
}
