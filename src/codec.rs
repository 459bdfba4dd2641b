//! # Status List Codec
//!
//! Wire codec for the `encodedList` property of a status list, per
//! [Bitstring Status List v1.0](https://www.w3.org/TR/vc-bitstring-status-list/):
//! GZIP compression followed by multibase base64url without padding (the
//! leading `u` is the multibase prefix for that alphabet).

use std::io::{Read, Write};

use base64ct::{Base64UrlUnpadded, Encoding};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::CodecError;

/// Compress and encode a raw status list buffer.
///
/// # Errors
///
/// Returns a [`CodecError`] if the buffer is empty or compression fails.
pub fn encode(buf: &[u8]) -> Result<String, CodecError> {
    if buf.is_empty() {
        return Err(CodecError::Compression("nothing to encode".into()));
    }

    let mut gz_encoder = GzEncoder::new(Vec::new(), Compression::best());
    gz_encoder.write_all(buf).map_err(|e| CodecError::Compression(e.to_string()))?;
    let compressed = gz_encoder.finish().map_err(|e| CodecError::Compression(e.to_string()))?;

    Ok(format!("u{}", Base64UrlUnpadded::encode_string(&compressed)))
}

/// Decode and decompress an encoded status list.
///
/// Tolerates input produced with the standard base64 alphabet or with
/// padding: `+`/`/` are mapped to `-`/`_` and `=` is stripped before
/// decoding.
///
/// # Errors
///
/// Returns a [`CodecError`] if the input is empty, is not valid base64, or
/// does not hold a well-formed GZIP stream.
pub fn decode(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let stripped = encoded.strip_prefix('u').unwrap_or(encoded);
    if stripped.is_empty() {
        return Err(CodecError::Decode("empty input".into()));
    }

    let normalized: String = stripped
        .chars()
        .filter(|c| *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    let compressed =
        Base64UrlUnpadded::decode_vec(&normalized).map_err(|e| CodecError::Decode(e.to_string()))?;

    let mut buf = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut buf)
        .map_err(|e| CodecError::Compression(e.to_string()))?;

    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let buf = vec![0x80, 0x00, 0xff, 0x03, 0x10];
        let encoded = encode(&buf).unwrap();
        assert_eq!(decode(&encoded).unwrap(), buf);
    }

    #[test]
    fn multibase_form() {
        let encoded = encode(&[0u8; 16384]).unwrap();
        assert!(encoded.starts_with('u'));
        assert!(
            encoded[1..].chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "encoded form must be unpadded base64url"
        );
    }

    #[test]
    fn accepts_standard_alphabet() {
        let buf = (0u8..=255).collect::<Vec<u8>>();
        let encoded = encode(&buf).unwrap();
        let standard: String = encoded[1..]
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                c => c,
            })
            .collect();
        assert_eq!(decode(&standard).unwrap(), buf);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(decode(""), Err(CodecError::Decode(_))));
        assert!(matches!(decode("u"), Err(CodecError::Decode(_))));
        assert!(matches!(decode("u!!not-base64!!"), Err(CodecError::Decode(_))));

        // valid base64, but not a gzip stream
        let bogus = format!("u{}", Base64UrlUnpadded::encode_string(b"plainly not gzip"));
        assert!(matches!(decode(&bogus), Err(CodecError::Compression(_))));
    }
}
