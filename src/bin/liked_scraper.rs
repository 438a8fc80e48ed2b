//! Scrape the liked-videos playlist through a real browser session.
//!
//! The official API under-reports liked videos, so this drives a visible
//! browser over WebDriver instead: infinite-scroll the playlist until the
//! page height stops growing, collect every rendered watch link, and write
//! the deduplicated set to a JSON file. Expects a WebDriver server
//! (e.g. chromedriver) listening at --webdriver.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Liked-videos scraper for the playlist exporter
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// WebDriver endpoint to connect to
    #[arg(long, default_value = "http://localhost:9515")]
    webdriver: String,

    /// Browser profile directory; keeps the signed-in session across runs
    #[arg(long, default_value = "bdata")]
    profile_dir: String,

    /// Home page used to detect whether a sign-in is needed
    #[arg(long, default_value = "https://music.youtube.com/")]
    home_url: String,

    /// Liked-videos playlist to scrape
    #[arg(long, default_value = "https://music.youtube.com/playlist?list=LM")]
    playlist_url: String,

    /// Output file for the scraped watch URLs
    #[arg(long, default_value = "data/liked_videos.json")]
    output: String,

    /// Delay between scroll steps, waiting for lazy-loaded content
    #[arg(long, default_value = "2000")]
    scroll_wait_ms: u64,
}

/// How long a manual sign-in may take before the run is aborted.
const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(180);

const EXTRACT_LINKS_JS: &str = "\
    const root = document.querySelector('#contents');\n\
    if (!root) return [];\n\
    return Array.from(root.querySelectorAll('.title .yt-simple-endpoint')).map(a => a.href);";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let client = connect(&args).await?;

    // The session is released on every exit path; an orphaned browser would
    // keep the profile directory locked.
    let outcome = scrape_liked_videos(&client, &args).await;
    if let Err(e) = client.close().await {
        tracing::warn!("failed to close browser session: {e}");
    }
    let urls = outcome?;

    write_output(Path::new(&args.output), &urls)?;
    tracing::info!(count = urls.len(), output = %args.output, "liked videos saved");
    Ok(())
}

async fn connect(args: &Args) -> Result<Client> {
    // Headless is deliberately not requested: the site blocks headless
    // sessions outright.
    let mut caps = serde_json::Map::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": [
                format!("--user-data-dir={}", args.profile_dir),
                "--disable-blink-features=AutomationControlled",
            ],
        }),
    );

    ClientBuilder::rustls()
        .context("failed to set up the WebDriver client")?
        .capabilities(caps)
        .connect(&args.webdriver)
        .await
        .with_context(|| format!("failed to connect to WebDriver at '{}'", args.webdriver))
}

async fn scrape_liked_videos(client: &Client, args: &Args) -> Result<Vec<String>> {
    tracing::info!("opening {}", args.home_url);
    client.goto(&args.home_url).await?;
    ensure_signed_in(client, &args.home_url).await?;

    tracing::info!("navigating to liked videos");
    client.goto(&args.playlist_url).await?;

    collect_until_stable(client, Duration::from_millis(args.scroll_wait_ms)).await
}

/// Click the sign-in control when it is present and wait for the human to
/// finish signing in (the browser lands back on the home page).
async fn ensure_signed_in(client: &Client, home_url: &str) -> Result<()> {
    let sign_in = match client.find(Locator::Css(r#"[aria-label="Sign in"]"#)).await {
        Ok(element) => element,
        Err(e) if e.is_no_such_element() => {
            tracing::info!("already signed in");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("sign-in required, complete it in the browser window");
    sign_in.click().await?;

    let deadline = Instant::now() + SIGN_IN_TIMEOUT;
    loop {
        let current = client.current_url().await?;
        if current.as_str().trim_end_matches('/') == home_url.trim_end_matches('/') {
            tracing::info!("sign-in complete");
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for sign-in to finish");
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

/// Scroll to the bottom until the page height stops changing, re-scanning
/// every rendered link after each step. Re-scans overlap heavily; the
/// accumulator's set semantics absorb the duplicates.
async fn collect_until_stable(client: &Client, wait: Duration) -> Result<Vec<String>> {
    let mut accumulator = LinkAccumulator::default();
    let mut previous_height: Option<i64> = None;

    loop {
        let height = client
            .execute("return document.body.scrollHeight", vec![])
            .await?
            .as_i64()
            .context("scrollHeight was not a number")?;
        if previous_height == Some(height) {
            break;
        }
        previous_height = Some(height);

        client
            .execute("window.scrollTo(0, document.body.scrollHeight)", vec![])
            .await?;
        tokio::time::sleep(wait).await;

        let links: Vec<String> =
            serde_json::from_value(client.execute(EXTRACT_LINKS_JS, vec![]).await?)
                .context("link extraction returned unexpected data")?;
        accumulator.extend(links.iter().map(String::as_str));
        tracing::debug!(height, collected = accumulator.len(), "scroll step");
    }

    Ok(accumulator.into_urls())
}

/// Deduplicating accumulator that preserves first-seen order.
#[derive(Default)]
struct LinkAccumulator {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl LinkAccumulator {
    fn extend<'a>(&mut self, links: impl Iterator<Item = &'a str>) {
        for link in links {
            let url = strip_list_param(link);
            if self.seen.insert(url.clone()) {
                self.ordered.push(url);
            }
        }
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }

    fn into_urls(self) -> Vec<String> {
        self.ordered
    }
}

/// Drop the playlist-context `list` query parameter from a scraped link.
fn strip_list_param(href: &str) -> String {
    let Some((base, query)) = href.split_once('?') else {
        return href.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            key != "list"
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

fn write_output(path: &Path, urls: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory '{}'", parent.display())
            })?;
        }
    }
    let json = serde_json::to_string_pretty(urls)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write output file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_the_list_parameter_wherever_it_sits() {
        assert_eq!(
            strip_list_param("https://music.youtube.com/watch?v=abc&list=LM"),
            "https://music.youtube.com/watch?v=abc"
        );
        assert_eq!(
            strip_list_param("https://music.youtube.com/watch?list=LM&v=abc"),
            "https://music.youtube.com/watch?v=abc"
        );
        assert_eq!(
            strip_list_param("https://music.youtube.com/watch?list=LM"),
            "https://music.youtube.com/watch"
        );
        assert_eq!(
            strip_list_param("https://music.youtube.com/watch?v=abc"),
            "https://music.youtube.com/watch?v=abc"
        );
        assert_eq!(
            strip_list_param("https://music.youtube.com/browse"),
            "https://music.youtube.com/browse"
        );
    }

    #[test]
    fn playlist_param_of_other_names_survives() {
        assert_eq!(
            strip_list_param("https://music.youtube.com/watch?v=abc&playlist=x"),
            "https://music.youtube.com/watch?v=abc&playlist=x"
        );
    }

    #[test]
    fn overlapping_scans_deduplicate_in_first_seen_order() {
        let mut acc = LinkAccumulator::default();
        acc.extend(
            [
                "https://music.youtube.com/watch?v=a&list=LM",
                "https://music.youtube.com/watch?v=b&list=LM",
            ]
            .into_iter(),
        );
        // Second scan re-sees everything plus one new link.
        acc.extend(
            [
                "https://music.youtube.com/watch?v=a&list=LM",
                "https://music.youtube.com/watch?v=b",
                "https://music.youtube.com/watch?v=c&list=LM",
            ]
            .into_iter(),
        );

        assert_eq!(
            acc.into_urls(),
            vec![
                "https://music.youtube.com/watch?v=a",
                "https://music.youtube.com/watch?v=b",
                "https://music.youtube.com/watch?v=c",
            ]
        );
    }

    #[test]
    fn output_file_is_a_pretty_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/liked_videos.json");
        let urls = vec!["https://music.youtube.com/watch?v=a".to_string()];

        write_output(&path, &urls).unwrap();

        let parsed: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, urls);
    }
}
