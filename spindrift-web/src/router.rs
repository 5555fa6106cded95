//! P2P scheme URL parsing and API action dispatch rules.
//!
//! Host applications forward `magnet:`, `bt://` and `bittorrent://` scheme
//! requests to this router. The URL itself names the torrent; query
//! parameters select the API action. Everything else renders the HTML
//! control document.

use std::str::FromStr;

use spindrift_core::magnet::{InfoHash, MagnetLink};
use url::Url;

/// URL scheme a P2P request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2pScheme {
    /// A raw `magnet:?xt=...` URI
    Magnet,
    /// `bt://<hash>`
    Bt,
    /// `bittorrent://<hash>`
    Bittorrent,
}

impl P2pScheme {
    /// Scheme name as it appears in URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            P2pScheme::Magnet => "magnet",
            P2pScheme::Bt => "bt",
            P2pScheme::Bittorrent => "bittorrent",
        }
    }
}

/// API action selected by `?action=api&api=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ApiAction {
    Start,
    Status,
    Pause,
    Resume,
    Remove,
}

impl ApiAction {
    /// Whether this action mutates state and therefore requires POST.
    pub fn requires_post(&self) -> bool {
        !matches!(self, ApiAction::Status)
    }
}

impl FromStr for ApiAction {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, RouterError> {
        match s {
            "start" => Ok(ApiAction::Start),
            "status" => Ok(ApiAction::Status),
            "pause" => Ok(ApiAction::Pause),
            "resume" => Ok(ApiAction::Resume),
            "remove" => Ok(ApiAction::Remove),
            other => Err(RouterError::Malformed {
                reason: format!("unknown api action: {other}"),
            }),
        }
    }
}

/// Request rejection reasons produced before any supervisor call.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Arbitrary web pages must not drive the engine; only the three P2P
    /// schemes are accepted.
    #[error("Unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("Malformed P2P URL: {reason}")]
    Malformed { reason: String },
}

/// A parsed inbound P2P request.
#[derive(Debug, Clone)]
pub struct P2pRequest {
    /// Scheme the request arrived on
    pub scheme: P2pScheme,
    /// Torrent named by the URL itself
    pub info_hash: InfoHash,
    /// Magnet URI equivalent of the request, used to (re)start downloads.
    pub magnet_uri: String,
    /// Query parameters in order; duplicate keys (e.g. `tr`) are preserved.
    pub params: Vec<(String, String)>,
}

impl P2pRequest {
    /// First value for a query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for a repeatable query parameter.
    pub fn params_all(&self, key: &str) -> Vec<String> {
        self.params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// The API action, if `action=api` is present.
    ///
    /// # Errors
    /// - `RouterError::Malformed` - `action=api` without a valid `api` value
    pub fn api_action(&self) -> Result<Option<ApiAction>, RouterError> {
        if self.param("action") != Some("api") {
            return Ok(None);
        }
        match self.param("api") {
            Some(name) => name.parse().map(Some),
            None => Err(RouterError::Malformed {
                reason: "action=api requires an api parameter".to_string(),
            }),
        }
    }
}

/// Parses a raw P2P scheme URL into a dispatchable request.
///
/// Accepts a full magnet URI, `bt://<hash>` or `bittorrent://<hash>` where
/// the hash sits in the host or first path segment, hex or base32 encoded.
///
/// # Errors
/// - `RouterError::UnsupportedScheme` - Scheme is not magnet/bt/bittorrent
/// - `RouterError::Malformed` - No parsable info hash in the URL
pub fn parse_p2p_url(raw: &str) -> Result<P2pRequest, RouterError> {
    let url = Url::parse(raw).map_err(|e| RouterError::Malformed {
        reason: format!("unparsable URL: {e}"),
    })?;

    let params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    match url.scheme() {
        "magnet" => {
            let magnet = MagnetLink::parse(raw).map_err(|e| RouterError::Malformed {
                reason: e.to_string(),
            })?;
            Ok(P2pRequest {
                scheme: P2pScheme::Magnet,
                info_hash: magnet.info_hash,
                // The routing parameters ride on the magnet itself; the
                // stored URI must stay replayable without them.
                magnet_uri: strip_routing_params(&magnet.uri),
                params,
            })
        }
        scheme @ ("bt" | "bittorrent") => {
            let hash_text = url
                .host_str()
                .filter(|host| !host.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    url.path_segments()
                        .and_then(|mut segments| segments.next())
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
                .ok_or_else(|| RouterError::Malformed {
                    reason: format!("{scheme} URL carries no info hash"),
                })?;
            let info_hash =
                InfoHash::from_str(&hash_text).map_err(|e| RouterError::Malformed {
                    reason: e.to_string(),
                })?;

            let request = P2pRequest {
                scheme: if scheme == "bt" {
                    P2pScheme::Bt
                } else {
                    P2pScheme::Bittorrent
                },
                info_hash,
                magnet_uri: String::new(),
                params,
            };
            let magnet_uri = build_magnet_uri(&request);
            Ok(P2pRequest {
                magnet_uri,
                ..request
            })
        }
        other => Err(RouterError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// Drops `action`, `api` and `hash` query parameters while preserving the
/// original encoding of everything else.
fn strip_routing_params(raw: &str) -> String {
    match raw.split_once('?') {
        Some((base, query)) => {
            let kept: Vec<&str> = query
                .split('&')
                .filter(|segment| {
                    let key = segment.split('=').next().unwrap_or("");
                    key != "action" && key != "api" && key != "hash"
                })
                .collect();
            if kept.is_empty() {
                base.to_string()
            } else {
                format!("{base}?{}", kept.join("&"))
            }
        }
        None => raw.to_string(),
    }
}

/// Magnet URI equivalent of a `bt://`-style request, carrying over any
/// display name and tracker hints from the query string.
fn build_magnet_uri(request: &P2pRequest) -> String {
    let mut uri = format!("magnet:?xt=urn:btih:{}", request.info_hash);
    if let Some(dn) = request.param("dn") {
        uri.push_str("&dn=");
        uri.push_str(&urlencoding::encode(dn));
    }
    for tracker in request.params_all("tr") {
        uri.push_str("&tr=");
        uri.push_str(&urlencoding::encode(&tracker));
    }
    uri
}
