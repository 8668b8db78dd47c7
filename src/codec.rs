//! Request body decoding.
//!
//! A batch body arrives as raw bytes plus an optional `Content-Encoding`
//! header. The codec first undoes the transfer encoding (gzip, when enabled)
//! and then parses the result as a JSON object.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::MultiGzDecoder;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::DEFAULT_MAX_DECODED_BYTES;

/// Errors produced while decoding or parsing a request body.
///
/// `Decode`, `CompressionDisabled` and `TooLarge` are decode failures;
/// `Parse` and `NotAnObject` are parse failures. All of them are client
/// errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The gzip stream could not be decompressed.
    #[error("failed to decompress gzip body: {0}")]
    Decode(#[source] std::io::Error),

    /// The body is gzip-encoded but gzip support is turned off.
    #[error("gzip-encoded body received but gzip support is disabled")]
    CompressionDisabled,

    /// The decompressed body exceeds the configured limit.
    #[error("decompressed body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// The body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    Parse(#[from] serde_json::Error),

    /// The body is valid JSON but not an object.
    #[error("JSON body is not an object")]
    NotAnObject,
}

impl CodecError {
    /// Returns true if the failure happened before JSON parsing.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            CodecError::Decode(_) | CodecError::CompressionDisabled | CodecError::TooLarge { .. }
        )
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// The declared content encoding of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    /// No encoding (header absent, empty, or `identity`).
    Identity,
    /// `gzip` or the legacy `x-gzip` alias.
    Gzip,
    /// Any other value. Bodies are passed through untouched.
    Other(String),
}

impl ContentEncoding {
    /// Interprets a `Content-Encoding` header value.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim) else {
            return ContentEncoding::Identity;
        };

        if value.is_empty() || value.eq_ignore_ascii_case("identity") {
            ContentEncoding::Identity
        } else if value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip") {
            ContentEncoding::Gzip
        } else {
            ContentEncoding::Other(value.to_string())
        }
    }
}

/// Settings injected into a [`Codec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Whether gzip bodies are decompressed or rejected.
    pub gzip_enabled: bool,
    /// Maximum size of a decompressed body.
    pub max_decoded_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            gzip_enabled: true,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
        }
    }
}

/// Decodes and parses batch request bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Codec { config }
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// Undoes the declared content encoding.
    ///
    /// Unencoded bodies and bodies with an unrecognized encoding are returned
    /// borrowed and unchanged.
    pub fn decode<'a>(&self, body: &'a [u8], encoding: &ContentEncoding) -> Result<Cow<'a, [u8]>> {
        match encoding {
            ContentEncoding::Gzip if !self.config.gzip_enabled => {
                Err(CodecError::CompressionDisabled)
            }
            ContentEncoding::Gzip => self.gunzip(body).map(Cow::Owned),
            ContentEncoding::Identity | ContentEncoding::Other(_) => Ok(Cow::Borrowed(body)),
        }
    }

    /// Parses decoded bytes as a JSON object.
    pub fn parse(&self, bytes: &[u8]) -> Result<Map<String, Value>> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(CodecError::NotAnObject),
        }
    }

    /// Runs [`decode`](Self::decode) followed by [`parse`](Self::parse).
    pub fn decode_and_parse(
        &self,
        body: &[u8],
        encoding: &ContentEncoding,
    ) -> Result<Map<String, Value>> {
        let decoded = self.decode(body, encoding)?;
        self.parse(&decoded)
    }

    fn gunzip(&self, body: &[u8]) -> Result<Vec<u8>> {
        let limit = self.config.max_decoded_bytes;
        let mut out = Vec::new();

        // Every member is decoded; trailing bytes that are not a gzip member
        // fail the whole body. Read one byte past the limit so an oversized
        // stream is detectable.
        MultiGzDecoder::new(body)
            .take((limit as u64).saturating_add(1))
            .read_to_end(&mut out)
            .map_err(CodecError::Decode)?;

        if out.len() > limit {
            return Err(CodecError::TooLarge { limit });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn codec(gzip_enabled: bool) -> Codec {
        Codec::new(CodecConfig {
            gzip_enabled,
            ..CodecConfig::default()
        })
    }

    #[test]
    fn content_encoding_from_header() {
        assert_eq!(ContentEncoding::from_header(None), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::from_header(Some("")), ContentEncoding::Identity);
        assert_eq!(
            ContentEncoding::from_header(Some("identity")),
            ContentEncoding::Identity
        );
        assert_eq!(ContentEncoding::from_header(Some("gzip")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header(Some(" GZIP ")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header(Some("x-gzip")), ContentEncoding::Gzip);
        assert_eq!(
            ContentEncoding::from_header(Some("br")),
            ContentEncoding::Other("br".to_string())
        );
    }

    #[test]
    fn identity_passes_bytes_through() {
        let body = br#"{"batch":[]}"#;
        let decoded = codec(true).decode(body, &ContentEncoding::Identity).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(&decoded[..], body);
    }

    #[test]
    fn unknown_encoding_passes_bytes_through() {
        let body = b"opaque";
        let decoded = codec(true)
            .decode(body, &ContentEncoding::Other("br".into()))
            .unwrap();
        assert_eq!(&decoded[..], body);
    }

    #[test]
    fn gzip_body_is_decompressed() {
        let body = br#"{"batch":[{"event":"a"}]}"#;
        let compressed = gzip(body);
        let decoded = codec(true)
            .decode(&compressed, &ContentEncoding::Gzip)
            .unwrap();
        assert_eq!(&decoded[..], body);
    }

    #[test]
    fn multi_member_gzip_is_concatenated() {
        let mut compressed = gzip(br#"{"batch":[{"event":"a"}"#);
        compressed.extend(gzip(br#",{"event":"b"}]}"#));

        let map = codec(true)
            .decode_and_parse(&compressed, &ContentEncoding::Gzip)
            .unwrap();

        assert_eq!(map["batch"][0]["event"], "a");
        assert_eq!(map["batch"][1]["event"], "b");
    }

    #[test]
    fn trailing_garbage_after_gzip_is_decode_error() {
        let mut compressed = gzip(br#"{"batch":[{"event":"a"}]}"#);
        compressed.extend_from_slice(b"GARBAGE-NOT-GZIP");

        let err = codec(true)
            .decode(&compressed, &ContentEncoding::Gzip)
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn unbounded_limit_does_not_overflow() {
        let codec = Codec::new(CodecConfig {
            gzip_enabled: true,
            max_decoded_bytes: usize::MAX,
        });
        let body = br#"{"batch":[]}"#;
        let compressed = gzip(body);
        let decoded = codec.decode(&compressed, &ContentEncoding::Gzip).unwrap();
        assert_eq!(&decoded[..], body);
    }

    #[test]
    fn corrupt_gzip_is_decode_error() {
        let err = codec(true)
            .decode(b"definitely not gzip", &ContentEncoding::Gzip)
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(err.is_decode());
    }

    #[test]
    fn truncated_gzip_is_decode_error() {
        let compressed = gzip(br#"{"batch":[{"event":"a"},{"event":"b"}]}"#);
        let truncated = &compressed[..compressed.len() / 2];
        let err = codec(true)
            .decode(truncated, &ContentEncoding::Gzip)
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn gzip_rejected_when_disabled() {
        let body = gzip(br#"{"batch":[]}"#);
        let err = codec(false).decode(&body, &ContentEncoding::Gzip).unwrap_err();
        assert!(matches!(err, CodecError::CompressionDisabled));
    }

    #[test]
    fn plain_body_labelled_gzip_rejected_when_disabled() {
        let err = codec(false)
            .decode(br#"{"batch":[]}"#, &ContentEncoding::Gzip)
            .unwrap_err();
        assert!(matches!(err, CodecError::CompressionDisabled));
    }

    #[test]
    fn oversized_gzip_is_rejected() {
        let codec = Codec::new(CodecConfig {
            gzip_enabled: true,
            max_decoded_bytes: 16,
        });
        let body = gzip(&[b'x'; 17]);
        let err = codec.decode(&body, &ContentEncoding::Gzip).unwrap_err();
        assert!(matches!(err, CodecError::TooLarge { limit: 16 }));
    }

    #[test]
    fn gzip_at_exact_limit_is_accepted() {
        let codec = Codec::new(CodecConfig {
            gzip_enabled: true,
            max_decoded_bytes: 16,
        });
        let body = gzip(&[b'x'; 16]);
        let decoded = codec.decode(&body, &ContentEncoding::Gzip).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn parse_accepts_object() {
        let map = codec(true).parse(br#"{"batch":[{"event":"a"}]}"#).unwrap();
        assert!(map.contains_key("batch"));
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = codec(true).parse(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Parse(_)));
        assert!(!err.is_decode());
    }

    #[test]
    fn parse_rejects_non_object() {
        let err = codec(true).parse(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, CodecError::NotAnObject));
    }

    #[test]
    fn decode_and_parse_gzip() {
        let body = gzip(br#"{"batch":[{"type":"track"}]}"#);
        let map = codec(true)
            .decode_and_parse(&body, &ContentEncoding::Gzip)
            .unwrap();
        assert_eq!(map["batch"][0]["type"], "track");
    }
}
