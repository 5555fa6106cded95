//! Spindrift Web - P2P scheme request router
//!
//! Parses `magnet:`, `bt://` and `bittorrent://` URLs forwarded by host
//! applications, dispatches API actions against the download supervisor,
//! and renders the HTML control document for everything else.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]

pub mod pages;
pub mod router;
pub mod server;

// Re-export main types
pub use router::{ApiAction, P2pRequest, P2pScheme, RouterError, parse_p2p_url};
pub use server::{AppState, build_router, run_server};
