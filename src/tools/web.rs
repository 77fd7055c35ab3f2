//! Page reading: rendered text content plus discovered links.
//!
//! Two fetch paths:
//! - Plain HTTP via `reqwest` with script/style-stripped text extraction.
//! - Chrome DevTools Protocol via `chromiumoxide` when `BROWSER_ENABLED` is
//!   set, for pages whose content only exists after client-side scripting.
//!   Start Chrome with: `google-chrome --remote-debugging-port=9222`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use url::Url;

use super::Tool;
use crate::config::Config;
use crate::error::FetchError;

/// Per-request timeout for plain HTTP fetches.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Settle delay after CDP navigation, for late-running scripts.
const RENDER_SETTLE: Duration = Duration::from_secs(3);

/// Page text above this length is truncated in tool output.
const MAX_PAGE_TEXT: usize = 12_000;

/// Extracted content of one task page.
#[derive(Debug, Clone)]
pub struct PageData {
    /// Human-readable text, as a rendered browser would display it.
    pub text: String,
    /// Absolute URLs of links and media sources found on the page.
    pub links: Vec<String>,
}

/// Shared browser state (lazy initialization).
static BROWSER_STATE: std::sync::LazyLock<Arc<Mutex<Option<BrowserSession>>>> =
    std::sync::LazyLock::new(|| Arc::new(Mutex::new(None)));

/// Browser session holding the browser and current page.
struct BrowserSession {
    #[allow(dead_code)]
    browser: Browser,
    page: Page,
}

/// Get or create the shared CDP browser session.
async fn get_browser_page(cdp_url: &str) -> anyhow::Result<Page> {
    let state = BROWSER_STATE.clone();
    let mut guard = state.lock().await;

    if guard.is_none() {
        let (browser, mut handler) = Browser::connect(cdp_url).await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to connect to Chrome at {}. Make sure Chrome is running with --remote-debugging-port=9222. Error: {}",
                cdp_url,
                e
            )
        })?;

        // Drive CDP events in the background.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("Browser event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        *guard = Some(BrowserSession { browser, page });
    }

    Ok(guard.as_ref().map(|s| s.page.clone()).unwrap())
}

/// Fetches task pages and renders them to readable text.
pub struct PageFetcher {
    client: reqwest::Client,
    browser_enabled: bool,
    cdp_url: String,
    retries: u32,
}

impl PageFetcher {
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.browser_enabled, config.browser_cdp_url.clone(), config.fetch_retries)
    }

    pub fn new(browser_enabled: bool, cdp_url: String, retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; quizchain/0.3)")
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            browser_enabled,
            cdp_url,
            retries,
        }
    }

    /// Fetch a page, retrying transient failures with backoff.
    pub async fn fetch(&self, url: &str) -> Result<PageData, FetchError> {
        let mut attempt = 0;
        loop {
            let result = if self.browser_enabled {
                self.fetch_rendered(url).await
            } else {
                self.fetch_static(url).await
            };

            match result {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = e.suggested_delay(attempt);
                    tracing::warn!(
                        "Fetch attempt {} for {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        url,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Plain HTTP fetch with HTML text extraction.
    async fn fetch_static(&self, url: &str) -> Result<PageData, FetchError> {
        tracing::debug!("Fetching page (static): {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::RenderFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NotFound {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::RenderFailure {
            url: url.to_string(),
            reason: format!("failed to read body: {}", e),
        })?;

        Ok(PageData {
            text: extract_text_from_html(&body),
            links: extract_links(&body, url),
        })
    }

    /// CDP fetch: navigate, let scripts settle, take the rendered text.
    async fn fetch_rendered(&self, url: &str) -> Result<PageData, FetchError> {
        tracing::debug!("Fetching page (CDP): {}", url);
        let render = |reason: String| FetchError::RenderFailure {
            url: url.to_string(),
            reason,
        };

        let page = get_browser_page(&self.cdp_url)
            .await
            .map_err(|e| render(e.to_string()))?;

        page.goto(url).await.map_err(|e| render(e.to_string()))?;
        tokio::time::sleep(RENDER_SETTLE).await;

        let text: String = page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(|e| render(e.to_string()))?
            .into_value()
            .map_err(|e| render(format!("innerText not a string: {}", e)))?;

        let html = page.content().await.map_err(|e| render(e.to_string()))?;

        Ok(PageData {
            text,
            links: extract_links(&html, url),
        })
    }
}

/// Extract readable text from HTML (simple approach).
pub fn extract_text_from_html(html: &str) -> String {
    // Remove script and style tags
    let mut text = html.to_string();

    while let Some(start) = text.find("<script") {
        if let Some(end) = text[start..].find("</script>") {
            text = format!("{}{}", &text[..start], &text[start + end + 9..]);
        } else {
            break;
        }
    }

    while let Some(start) = text.find("<style") {
        if let Some(end) = text[start..].find("</style>") {
            text = format!("{}{}", &text[..start], &text[start + end + 8..]);
        } else {
            break;
        }
    }

    // Remove all tags
    let mut result = String::new();
    let mut in_tag = false;
    for c in text.chars() {
        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag {
            result.push(c);
        }
    }

    let result: String = result.split_whitespace().collect::<Vec<_>>().join(" ");
    html_decode(&result)
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Extract `href`/`src` targets as absolute URLs, deduplicated in order.
pub fn extract_links(html: &str, base: &str) -> Vec<String> {
    let base_url = Url::parse(base).ok();
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for attr in ["href=\"", "src=\""] {
        for chunk in html.split(attr).skip(1) {
            let Some(raw) = chunk.split('"').next() else {
                continue;
            };
            if raw.is_empty() || raw.starts_with('#') || raw.starts_with("javascript:") {
                continue;
            }
            let absolute = match &base_url {
                Some(b) => match b.join(raw) {
                    Ok(u) => u.to_string(),
                    Err(_) => continue,
                },
                None => raw.to_string(),
            };
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    }

    links
}

/// Read a quiz page and return its visible text plus discovered links.
pub struct ReadPage {
    fetcher: Arc<PageFetcher>,
}

impl ReadPage {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for ReadPage {
    fn name(&self) -> &str {
        "read_page"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its rendered text content along with the absolute URLs of links found on it. Use to read task pages or follow references."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to read"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _scratch_dir: &Path) -> anyhow::Result<String> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;

        let page = self.fetcher.fetch(url).await?;

        let mut text = page.text;
        if text.len() > MAX_PAGE_TEXT {
            text.truncate(MAX_PAGE_TEXT);
            text.push_str("\n[truncated]");
        }

        if page.links.is_empty() {
            Ok(text)
        } else {
            Ok(format!("{}\n\nLinks:\n{}", text, page.links.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_strips_markup() {
        let html = r#"<html><head><style>body{color:red}</style>
            <script>var x = "<b>nope</b>";</script></head>
            <body><h1>Quiz Task 1</h1><p>Calculate the sum of 10 &amp; 20.</p></body></html>"#;
        let text = extract_text_from_html(html);
        assert!(text.contains("Quiz Task 1"));
        assert!(text.contains("10 & 20"));
        assert!(!text.contains("color:red"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_extract_links_absolute_and_relative() {
        let html = r##"<a href="/files/data.csv">data</a>
            <a href="https://other.example/audio.mp3">audio</a>
            <a href="#top">top</a>
            <audio src="clip.wav"></audio>"##;
        let links = extract_links(html, "http://quiz.example/task/1");
        assert!(links.contains(&"http://quiz.example/files/data.csv".to_string()));
        assert!(links.contains(&"https://other.example/audio.mp3".to_string()));
        assert!(links.contains(&"http://quiz.example/task/clip.wav".to_string()));
        assert!(!links.iter().any(|l| l.ends_with("#top")));
    }

    #[test]
    fn test_extract_links_dedup() {
        let html = r#"<a href="/f.csv">one</a><a href="/f.csv">two</a>"#;
        let links = extract_links(html, "http://quiz.example/");
        assert_eq!(links.len(), 1);
    }
}
