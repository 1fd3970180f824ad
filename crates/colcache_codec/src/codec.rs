// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Compression format written into envelopes.
pub const FORMAT_ZSTD: &str = "zstd";

/// Text encoding of the compressed bytes in envelopes.
pub const ENCODING_BASE64: &str = "base64";

/// Default zstd compression level.
pub const DEFAULT_LEVEL: i32 = 3;

/// Serialized size below which values are stored uncompressed.
pub const DEFAULT_MIN_SIZE: usize = 1024;

/// The stored form of a compressed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedEnvelope {
    /// Always `true`; marks the value as an envelope.
    pub compressed: bool,
    /// Compression algorithm, `"zstd"`.
    pub format: String,
    /// Byte encoding of `data`, `"base64"`.
    pub encoding: String,
    /// The encoded compressed bytes of the serialized value.
    pub data: String,
}

impl CompressedEnvelope {
    /// Returns `true` if `value` has the envelope marker `compressed: true`.
    #[must_use]
    pub fn is_envelope(value: &Value) -> bool {
        value.get("compressed").and_then(Value::as_bool) == Some(true)
    }
}

/// Compresses values into [`CompressedEnvelope`]s and back.
///
/// # Examples
///
/// ```
/// use colcache_codec::Codec;
/// use serde_json::json;
///
/// let codec = Codec::new().with_min_size(0);
/// let value = json!({ "route": "galibier", "samples": vec![1843; 512] });
///
/// let stored = codec.compress(value.clone());
/// assert_eq!(stored["compressed"], true);
/// assert_eq!(codec.decompress(stored), value);
///
/// // Values that are not envelopes pass through.
/// assert_eq!(codec.decompress(json!("plain")), json!("plain"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    enabled: bool,
    level: i32,
    min_size: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// Creates a codec with zstd level 3 and a 1 KiB threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: cfg!(feature = "zstd"),
            level: DEFAULT_LEVEL,
            min_size: DEFAULT_MIN_SIZE,
        }
    }

    /// Creates a codec that never compresses but still reads envelopes when it can.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Sets the zstd compression level.
    #[must_use]
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Sets the serialized size below which values are left uncompressed.
    #[must_use]
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Returns `true` if this codec compresses values.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.enabled && cfg!(feature = "zstd")
    }

    /// Compresses `value` into an envelope.
    ///
    /// Returns `Ok(None)` when compression is bypassed: the codec is unavailable,
    /// the serialized value is under the size threshold, or the envelope would not be
    /// smaller than the plain value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or compression fails.
    pub fn try_compress(&self, value: &Value) -> Result<Option<Value>> {
        if !self.is_available() {
            return Ok(None);
        }

        let json = serde_json::to_vec(value).map_err(|e| Error::caused_by("serialize value", e))?;
        if json.len() < self.min_size {
            return Ok(None);
        }

        let data = STANDARD.encode(self.compress_bytes(&json)?);
        if data.len() >= json.len() {
            return Ok(None);
        }

        let envelope = CompressedEnvelope {
            compressed: true,
            format: FORMAT_ZSTD.to_string(),
            encoding: ENCODING_BASE64.to_string(),
            data,
        };
        serde_json::to_value(envelope)
            .map(Some)
            .map_err(|e| Error::caused_by("serialize envelope", e))
    }

    /// Compresses `value`, returning it unchanged when compression is bypassed or fails.
    #[must_use]
    pub fn compress(&self, value: Value) -> Value {
        match self.try_compress(&value) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => value,
            Err(e) => {
                tracing::warn!(error = %e, "compression failed, storing value uncompressed");
                value
            }
        }
    }

    /// Restores the value inside an envelope.
    ///
    /// Returns `Ok(None)` when `input` is not an envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope is malformed, uses an unsupported format or
    /// encoding, or its data does not decode.
    pub fn try_decompress(&self, input: &Value) -> Result<Option<Value>> {
        if !CompressedEnvelope::is_envelope(input) {
            return Ok(None);
        }

        let envelope = CompressedEnvelope::deserialize(input).map_err(|e| Error::caused_by("read envelope", e))?;
        if envelope.format != FORMAT_ZSTD {
            return Err(Error::caused_by(
                "recognize format",
                format!("unsupported format {}", envelope.format),
            ));
        }
        if envelope.encoding != ENCODING_BASE64 {
            return Err(Error::caused_by(
                "recognize encoding",
                format!("unsupported encoding {}", envelope.encoding),
            ));
        }

        let bytes = STANDARD
            .decode(envelope.data.as_bytes())
            .map_err(|e| Error::caused_by("decode base64", e))?;
        let json = decompress_bytes(&bytes)?;
        serde_json::from_slice(&json)
            .map(Some)
            .map_err(|e| Error::caused_by("parse value", e))
    }

    /// Restores the value inside an envelope, passing everything else through.
    ///
    /// A malformed or unsupported envelope is returned unchanged.
    #[must_use]
    pub fn decompress(&self, input: Value) -> Value {
        match self.try_decompress(&input) {
            Ok(Some(value)) => value,
            Ok(None) => input,
            Err(e) => {
                tracing::warn!(error = %e, "decompression failed, returning stored payload");
                input
            }
        }
    }

    #[cfg(feature = "zstd")]
    fn compress_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(bytes, self.level).map_err(|e| Error::caused_by("compress", e))
    }

    #[cfg(not(feature = "zstd"))]
    fn compress_bytes(&self, _bytes: &[u8]) -> Result<Vec<u8>> {
        Err(Error::caused_by("compress", "zstd support is not compiled in"))
    }
}

#[cfg(feature = "zstd")]
fn decompress_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::decode_all(bytes).map_err(|e| Error::caused_by("decompress", e))
}

#[cfg(not(feature = "zstd"))]
fn decompress_bytes(_bytes: &[u8]) -> Result<Vec<u8>> {
    Err(Error::caused_by("decompress", "zstd support is not compiled in"))
}
