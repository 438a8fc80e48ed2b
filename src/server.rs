//! The playlist selection service: a small axum app that walks the user
//! through authorization, renders the playlist picker, and writes the chosen
//! playlist's watch URLs to disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::{Mutex, Notify};
use yt_api::{Playlist, YouTubeClient};
use yt_auth::Authenticator;

use crate::status::{DownloadStatus, StatusTracker};

/// How long /auth waits for the callback before redirecting anyway.
const AUTH_WAIT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    auth: Arc<Mutex<Authenticator>>,
    api: YouTubeClient,
    status: Arc<StatusTracker>,
    pending_verifier: Arc<Mutex<Option<String>>>,
    authorized: Arc<Notify>,
    data_dir: PathBuf,
}

impl AppState {
    pub fn new(auth: Authenticator, api: YouTubeClient, data_dir: PathBuf) -> Self {
        Self {
            auth: Arc::new(Mutex::new(auth)),
            api,
            status: Arc::new(StatusTracker::default()),
            pending_verifier: Arc::new(Mutex::new(None)),
            authorized: Arc::new(Notify::new()),
            data_dir,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth", get(begin_auth))
        .route("/oauth2callback", get(oauth_callback))
        .route("/choose-playlist", get(choose_playlist))
        .route("/download-playlist", get(download_playlist))
        .route("/status", get(download_status))
        .with_state(state)
}

/// Error response carrying the HTTP status it surfaces as.
#[derive(Debug)]
struct ServiceError {
    status: StatusCode,
    message: String,
}

impl ServiceError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        tracing::error!(status = %self.status, "{}", self.message);
        (self.status, self.message).into_response()
    }
}

/// GET /auth - skip straight to the picker when a token already exists,
/// otherwise open the consent page in the system browser and wait for the
/// callback to land.
async fn begin_auth(State(state): State<AppState>) -> Result<Redirect, ServiceError> {
    {
        let mut auth = state.auth.lock().await;
        if auth.is_authorized() || auth.load_stored().map_err(ServiceError::internal)? {
            return Ok(Redirect::to("/choose-playlist"));
        }

        let (url, verifier) = auth.authorize_url();
        drop(auth);
        *state.pending_verifier.lock().await = Some(verifier);

        webbrowser::open(&url)
            .context("failed to open browser for oauth")
            .map_err(ServiceError::internal)?;
        tracing::info!("opened system browser for authorization");
    }

    // Redirect once the callback fires, or after the timeout as a fallback;
    // /choose-playlist bounces back here if authorization never completed.
    if tokio::time::timeout(AUTH_WAIT, state.authorized.notified())
        .await
        .is_err()
    {
        tracing::warn!("timed out waiting for the authorization callback");
    }

    Ok(Redirect::to("/choose-playlist"))
}

#[derive(Debug, Deserialize)]
struct AuthCallback {
    code: Option<String>,
    error: Option<String>,
}

/// GET /oauth2callback - exchange the one-time code, persist the token, and
/// wake up the waiting /auth request. The browser tab gets a bare 200.
async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<AuthCallback>,
) -> Result<StatusCode, ServiceError> {
    if let Some(error) = params.error {
        return Err(ServiceError::internal(anyhow::anyhow!(
            "authorization failed: {error}"
        )));
    }
    let code = params
        .code
        .ok_or_else(|| ServiceError::bad_request("missing authorization code"))?;
    let verifier = state
        .pending_verifier
        .lock()
        .await
        .take()
        .ok_or_else(|| ServiceError::bad_request("no authorization in progress"))?;

    state
        .auth
        .lock()
        .await
        .exchange_code(&code, &verifier)
        .await
        .map_err(ServiceError::internal)?;

    state.authorized.notify_one();
    Ok(StatusCode::OK)
}

/// GET /choose-playlist - render the picker over all playlists the user owns.
async fn choose_playlist(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let access_token = {
        let mut auth = state.auth.lock().await;
        if !auth.is_authorized() && !auth.load_stored().map_err(ServiceError::internal)? {
            return Ok(Redirect::to("/auth").into_response());
        }
        auth.access_token().await.map_err(ServiceError::internal)?
    };

    let playlists = state
        .api
        .list_my_playlists(&access_token)
        .await
        .map_err(|e| ServiceError::internal(e.context("failed to fetch playlists")))?;

    Ok(Html(render_picker(&playlists)).into_response())
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    #[serde(rename = "playlistId")]
    playlist_id: Option<String>,
}

/// GET /download-playlist - fetch every item of the chosen playlist and write
/// the watch URLs to `data/playlist_<id>.json`.
async fn download_playlist(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Html<String>, ServiceError> {
    // Validation happens before the status is touched; rejected requests
    // leave the previous download's status in place.
    let access_token = {
        let mut auth = state.auth.lock().await;
        if !auth.is_authorized() && !auth.load_stored().map_err(ServiceError::internal)? {
            return Err(ServiceError::unauthorized(
                "not authorized, go to /auth first",
            ));
        }
        auth.access_token().await.map_err(ServiceError::internal)?
    };

    let playlist_id = query
        .playlist_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServiceError::bad_request("missing playlistId, choose a playlist first"))?;

    state.status.set(DownloadStatus::InProgress);
    match export_playlist(&state, &access_token, &playlist_id).await {
        Ok((count, path)) => {
            state.status.set(DownloadStatus::Completed);
            Ok(Html(render_confirmation(count, &path)))
        }
        Err(e) => {
            state.status.set(DownloadStatus::Error);
            Err(ServiceError::internal(e.context("playlist download failed")))
        }
    }
}

async fn export_playlist(
    state: &AppState,
    access_token: &str,
    playlist_id: &str,
) -> anyhow::Result<(usize, PathBuf)> {
    let urls = state.api.list_playlist_items(access_token, playlist_id).await?;

    std::fs::create_dir_all(&state.data_dir).with_context(|| {
        format!("failed to create data directory '{}'", state.data_dir.display())
    })?;
    let path = state.data_dir.join(format!("playlist_{playlist_id}.json"));
    let json = serde_json::to_string_pretty(&urls)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    tracing::info!(count = urls.len(), path = %path.display(), "playlist exported");
    Ok((urls.len(), path))
}

/// GET /status - plain report of the current download status.
async fn download_status(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>download status</title></head>\n<body>\n\
         <h1>current status: {}</h1>\n</body>\n</html>",
        state.status.get()
    ))
}

fn render_picker(playlists: &[Playlist]) -> String {
    let options: String = playlists
        .iter()
        .map(|p| {
            format!(
                "<option value=\"{}\">{}</option>",
                escape_html(&p.id),
                escape_html(&p.title)
            )
        })
        .collect();

    format!(
        r#"<html>
<head>
  <title>choose playlist</title>
  <style>
    body {{ font-family: sans-serif; }}
    #container {{ margin: 20px; }}
    select, button {{ margin-top: 10px; }}
  </style>
</head>
<body>
  <div id="container">
    <h1>choose a playlist to download</h1>
    <select id="playlistSelect">{options}</select>
    <br/>
    <button id="downloadBtn">download playlist</button>
  </div>
  <script>
    const downloadBtn = document.querySelector('#downloadBtn');
    const select = document.querySelector('#playlistSelect');
    downloadBtn.addEventListener('click', () => {{
      const chosenId = select.value;
      if (!chosenId) {{
        alert('no playlist selected!');
        return;
      }}
      window.location.href = '/download-playlist?playlistId=' + chosenId;
    }});
  </script>
</body>
</html>
"#
    )
}

fn render_confirmation(count: usize, path: &std::path::Path) -> String {
    format!(
        r#"<html>
<head><title>download complete</title></head>
<body>
  <h1>download complete!</h1>
  <p>downloaded {count} items to <strong>{}</strong></p>
  <p><a href="/status" target="_blank">check status</a></p>
  <script>window.close()</script>
</body>
</html>
"#,
        escape_html(&path.display().to_string())
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
