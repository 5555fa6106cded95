//! Magnet URI parsing and the torrent content identifier.
//!
//! Extracts the info hash, display name, and tracker hints from a magnet
//! link. Accepts both hex (40 chars) and base32 (32 chars) `btih` encodings,
//! normalizing everything to lowercase hex.

use std::fmt;
use std::str::FromStr;

use crate::DownloadError;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte hash of the torrent's info dictionary. Rendered as a 40-character
/// lowercase hex string everywhere it crosses an API or file boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from a 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to the underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for InfoHash {
    type Err = DownloadError;

    /// Parses a 40-char hex or 32-char base32 info hash, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            40 => {
                let bytes = hex::decode(s).map_err(|_| DownloadError::InvalidMagnet {
                    reason: format!("invalid hex info hash: {s}"),
                })?;
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&bytes);
                Ok(Self(hash))
            }
            32 => decode_base32(s).map(Self),
            len => Err(DownloadError::InvalidMagnet {
                reason: format!("info hash must be 40 hex or 32 base32 chars, got {len}"),
            }),
        }
    }
}

impl serde::Serialize for InfoHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for InfoHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Decodes an RFC 4648 base32 string (no padding) into a 20-byte hash.
fn decode_base32(s: &str) -> Result<[u8; 20], DownloadError> {
    let mut out = [0u8; 20];
    let mut buffer: u64 = 0;
    let mut bits = 0usize;
    let mut written = 0usize;

    for ch in s.bytes() {
        let value = match ch {
            b'A'..=b'Z' => ch - b'A',
            b'a'..=b'z' => ch - b'a',
            b'2'..=b'7' => ch - b'2' + 26,
            _ => {
                return Err(DownloadError::InvalidMagnet {
                    reason: format!("invalid base32 character '{}'", ch as char),
                });
            }
        };
        buffer = (buffer << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out[written] = (buffer >> bits) as u8;
            written += 1;
        }
    }

    debug_assert_eq!(written, 20);
    Ok(out)
}

/// Parsed magnet URI components.
///
/// Minimal torrent metadata carried by a magnet link: the info hash plus
/// optional display name and tracker URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
    /// The original URI, preserved verbatim for restart-after-crash.
    pub uri: String,
}

impl MagnetLink {
    /// Parses a magnet URI into its components.
    ///
    /// Requires an `xt=urn:btih:<hash>` parameter; collects every `tr`
    /// parameter in order and the `dn` display name if present.
    ///
    /// # Errors
    /// - `DownloadError::InvalidMagnet` - Not a magnet URI or missing/bad `xt`
    pub fn parse(uri: &str) -> Result<Self, DownloadError> {
        let parsed = url::Url::parse(uri).map_err(|e| DownloadError::InvalidMagnet {
            reason: format!("unparsable URI: {e}"),
        })?;

        if parsed.scheme() != "magnet" {
            return Err(DownloadError::InvalidMagnet {
                reason: format!("expected magnet scheme, got {}", parsed.scheme()),
            });
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    let hash_part = value.strip_prefix("urn:btih:").ok_or_else(|| {
                        DownloadError::InvalidMagnet {
                            reason: format!("unsupported xt parameter: {value}"),
                        }
                    })?;
                    info_hash = Some(hash_part.parse::<InfoHash>()?);
                }
                "dn" => display_name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| DownloadError::InvalidMagnet {
            reason: "missing xt=urn:btih parameter".to_string(),
        })?;

        Ok(Self {
            info_hash,
            display_name,
            trackers,
            uri: uri.to_string(),
        })
    }
}
