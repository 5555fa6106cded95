//! Rendered HTML control document for a single torrent.
//!
//! Served for any P2P request that does not select an API action. The page
//! shows the download, offers pause/resume/remove controls, and polls the
//! status API to keep itself current.

use axum::response::Html;
use spindrift_core::magnet::InfoHash;
use spindrift_core::status::{DownloadState, DownloadStatus};

/// Interval at which the control page re-polls the status API.
const POLL_INTERVAL_MS: u32 = 2000;

/// Renders the control document for one torrent.
///
/// `status` is `None` when the hash is known from the URL but nothing has
/// been started yet; the page then offers only the start control.
pub fn control_page(info_hash: InfoHash, status: Option<&DownloadStatus>) -> Html<String> {
    let body = match status {
        Some(status) => known_torrent_body(status),
        None => unknown_torrent_body(info_hash),
    };
    Html(page_shell(&info_hash.to_string(), &body))
}

fn page_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Spindrift — {title}</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 640px; margin: 2rem auto; padding: 0 1rem; }}
progress {{ width: 100%; height: 1.2rem; }}
.state {{ text-transform: lowercase; color: #555; }}
button {{ margin-right: 0.5rem; }}
</style>
</head>
<body>
{body}
<script>
async function api(action, method) {{
  // The page itself lives at /p2p?url=...; the API wants the inner P2P
  // URL with the routing parameters appended, not the page address.
  const inner = new URL(window.location).searchParams.get('url');
  const target = inner + (inner.includes('?') ? '&' : '?') + 'action=api&api=' + action;
  const response = await fetch('/p2p?url=' + encodeURIComponent(target), {{ method }});
  if (action !== 'status') window.location.reload();
  return response.ok ? response.json() : null;
}}
async function refresh() {{
  const status = await api('status', 'GET');
  if (!status) return;
  const bar = document.getElementById('progress');
  if (bar) bar.value = status.progress;
  const state = document.getElementById('state');
  if (state) state.textContent = status.state + ' — ' + status.numPeers + ' peers';
}}
setInterval(refresh, {POLL_INTERVAL_MS});
</script>
</body>
</html>"#
    )
}

fn known_torrent_body(status: &DownloadStatus) -> String {
    let controls = match status.state {
        DownloadState::Active | DownloadState::Starting => {
            r#"<button onclick="api('pause', 'POST')">Pause</button>
<button onclick="api('remove', 'POST')">Remove</button>"#
        }
        DownloadState::Paused => {
            r#"<button onclick="api('resume', 'POST')">Resume</button>
<button onclick="api('remove', 'POST')">Remove</button>"#
        }
        DownloadState::Done | DownloadState::Removed => {
            r#"<button onclick="api('remove', 'POST')">Remove</button>"#
        }
    };
    format!(
        r#"<h1>{name}</h1>
<p class="state" id="state">{state:?} — {peers} peers</p>
<progress id="progress" value="{progress}" max="1"></progress>
<p>{downloaded} of {total} bytes — {speed} B/s</p>
<p>{controls}</p>"#,
        name = html_escape(&status.name),
        state = status.state,
        peers = status.num_peers,
        progress = status.progress,
        downloaded = status.downloaded,
        total = status.files.iter().map(|f| f.length).sum::<u64>(),
        speed = status.download_speed,
    )
}

fn unknown_torrent_body(info_hash: InfoHash) -> String {
    format!(
        r#"<h1>Torrent {info_hash}</h1>
<p class="state">not started</p>
<p><button onclick="api('start', 'POST')">Start download</button></p>"#
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
