//! Thin YouTube Data API v3 client.
//!
//! Covers exactly the two listing endpoints the exporter needs, with the
//! shared fetch-until-no-next-page loop in one place. Pages are requested at
//! the API maximum of 50 items and accumulated in arrival order; any single
//! page failure aborts the whole fetch.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Default REST API base, overridable for tests.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

/// Canonical watch URL prefix for playlist items.
pub const WATCH_URL_BASE: &str = "https://music.youtube.com/watch?v=";

/// API maximum page size for list endpoints.
const MAX_PAGE_SIZE: &str = "50";

/// A playlist owned by the authenticated user. Fetched fresh on every picker
/// render, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: String,
    pub title: String,
}

/// Common envelope of the list endpoints: a page of items plus an opaque
/// continuation token when more pages exist.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    id: String,
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemResource {
    content_details: PlaylistItemContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: String,
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Client pointed at a non-default API base (tests run against an
    /// in-process server).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// All playlists owned by the authenticated user, in API return order.
    pub async fn list_my_playlists(&self, access_token: &str) -> Result<Vec<Playlist>> {
        let resources: Vec<PlaylistResource> = self
            .fetch_all_pages(access_token, "playlists", &[("part", "snippet"), ("mine", "true")])
            .await?;

        Ok(resources
            .into_iter()
            .map(|r| Playlist {
                id: r.id,
                title: r.snippet.title,
            })
            .collect())
    }

    /// All items of the given playlist, mapped to canonical watch URLs, in
    /// API return order.
    pub async fn list_playlist_items(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<Vec<String>> {
        let resources: Vec<PlaylistItemResource> = self
            .fetch_all_pages(
                access_token,
                "playlistItems",
                &[
                    ("part", "snippet,contentDetails"),
                    ("playlistId", playlist_id),
                ],
            )
            .await?;

        Ok(resources
            .into_iter()
            .map(|r| watch_url(&r.content_details.video_id))
            .collect())
    }

    /// Issue page requests carrying the previous response's continuation
    /// token until a response carries none, accumulating items in order.
    async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        access_token: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let url = format!("{}/youtube/v3/{}", self.base_url, endpoint);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(params)
                .query(&[("maxResults", MAX_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("request to '{endpoint}' failed"))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                bail!("'{endpoint}' returned status {status}: {body}");
            }

            let page: Page<T> = response
                .json()
                .await
                .with_context(|| format!("failed to decode '{endpoint}' page"))?;

            items.extend(page.items);
            pages += 1;

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(endpoint, pages, items = items.len(), "paginated fetch complete");
        Ok(items)
    }
}

/// Fully qualified watch URL for a raw video identifier.
pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_URL_BASE}{video_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Query, State};
    use axum::routing::get;
    use axum::{Json, Router};

    struct MockApi {
        requests: AtomicUsize,
        pages: Vec<serde_json::Value>,
    }

    /// Serve `pages` in order, keyed by the pageToken query parameter, and
    /// count every request.
    async fn serve_pages(state: Arc<MockApi>) -> String {
        let handler = |State(state): State<Arc<MockApi>>,
                       Query(params): Query<HashMap<String, String>>| async move {
            state.requests.fetch_add(1, Ordering::SeqCst);
            assert_eq!(params.get("maxResults").map(String::as_str), Some("50"));
            let index = params
                .get("pageToken")
                .map(|t| t.parse::<usize>().unwrap())
                .unwrap_or(0);
            Json(state.pages[index].clone())
        };

        let app = Router::new()
            .route("/youtube/v3/playlists", get(handler))
            .route("/youtube/v3/playlistItems", get(handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    fn item(video_id: &str) -> serde_json::Value {
        serde_json::json!({
            "snippet": { "title": video_id },
            "contentDetails": { "videoId": video_id },
        })
    }

    #[tokio::test]
    async fn concatenates_pages_in_order_with_one_request_per_page() {
        let state = Arc::new(MockApi {
            requests: AtomicUsize::new(0),
            pages: vec![
                serde_json::json!({ "items": [item("v1"), item("v2")], "nextPageToken": "1" }),
                serde_json::json!({ "items": [item("v3")], "nextPageToken": "2" }),
                serde_json::json!({ "items": [item("v4"), item("v5")] }),
            ],
        });
        let base = serve_pages(Arc::clone(&state)).await;

        let client = YouTubeClient::with_base_url(base);
        let urls = client.list_playlist_items("tok", "PL123").await.unwrap();

        assert_eq!(
            urls,
            ["v1", "v2", "v3", "v4", "v5"].map(watch_url).to_vec()
        );
        assert_eq!(state.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_single_page_yields_empty_sequence() {
        let state = Arc::new(MockApi {
            requests: AtomicUsize::new(0),
            pages: vec![serde_json::json!({})],
        });
        let base = serve_pages(Arc::clone(&state)).await;

        let client = YouTubeClient::with_base_url(base);
        let urls = client.list_playlist_items("tok", "PLempty").await.unwrap();

        assert!(urls.is_empty());
        assert_eq!(state.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn playlists_are_mapped_from_snippet_titles() {
        let state = Arc::new(MockApi {
            requests: AtomicUsize::new(0),
            pages: vec![serde_json::json!({
                "items": [
                    { "id": "PL1", "snippet": { "title": "road trip" } },
                    { "id": "PL2", "snippet": { "title": "focus" } },
                ],
            })],
        });
        let base = serve_pages(state).await;

        let client = YouTubeClient::with_base_url(base);
        let playlists = client.list_my_playlists("tok").await.unwrap();

        assert_eq!(
            playlists,
            vec![
                Playlist { id: "PL1".into(), title: "road trip".into() },
                Playlist { id: "PL2".into(), title: "focus".into() },
            ]
        );
    }

    #[tokio::test]
    async fn upstream_error_aborts_the_whole_fetch() {
        let app = Router::new().route(
            "/youtube/v3/playlistItems",
            get(|| async { (axum::http::StatusCode::FORBIDDEN, "quota exceeded") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = YouTubeClient::with_base_url(format!("http://{addr}"));
        let err = client
            .list_playlist_items("tok", "PL123")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
