//! Content-addressed cache keys.
//!
//! A conversion is identified by the digest of its input bytes combined
//! with the requested options, so identical inputs converted with
//! identical settings always hit the same cache entry.

use super::types::ConvertOptions;
use sha3::{Digest, Sha3_256};
use std::fmt::Write as _;

/// Derives the cache key for converting `data` with `options`.
///
/// Field separators keep distinct `(data, options)` pairs from colliding
/// on concatenation boundaries.
pub fn conversion_key(data: &[u8], options: &ConvertOptions) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.update([0u8]);
    hasher.update(options.format.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update([options.quality]);
    hasher.update([0u8]);
    if let Some((width, height)) = options.max_dimensions {
        hasher.update(width.to_be_bytes());
        hasher.update(height.to_be_bytes());
    }

    let digest = hasher.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(key, "{:02x}", byte);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::types::ImageFormat;

    fn options() -> ConvertOptions {
        ConvertOptions::new(ImageFormat::Png).with_quality(80)
    }

    #[test]
    fn identical_inputs_and_options_share_a_key() {
        let key_a = conversion_key(b"image bytes", &options());
        let key_b = conversion_key(b"image bytes", &options());
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn key_is_hex_of_fixed_length() {
        let key = conversion_key(b"image bytes", &options());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_data_changes_the_key() {
        assert_ne!(
            conversion_key(b"one", &options()),
            conversion_key(b"two", &options())
        );
    }

    #[test]
    fn each_option_field_changes_the_key() {
        let base = conversion_key(b"data", &options());

        let other_format = ConvertOptions::new(ImageFormat::WebP).with_quality(80);
        assert_ne!(base, conversion_key(b"data", &other_format));

        let other_quality = options().with_quality(50);
        assert_ne!(base, conversion_key(b"data", &other_quality));

        let with_dims = options().with_max_dimensions(640, 480);
        assert_ne!(base, conversion_key(b"data", &with_dims));
    }
}
