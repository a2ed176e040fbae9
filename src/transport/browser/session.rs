//! Single-attempt rendering session.
//!
//! A session is opened for one attempt and closed afterwards. Launched
//! browsers get a throwaway profile directory; remote browsers get a fresh
//! browser context carrying the attempt's proxy, disposed on close.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Page};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::BrowserConfig;
use crate::models::{ConnectionDescriptor, FailureKind};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

/// Resolves once the load event has fired.
const WAIT_FOR_LOAD_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete') {
            resolve(document.readyState);
        } else {
            window.addEventListener('load', () => resolve(document.readyState));
        }
    })
"#;

/// Visible text of the rendered document.
const VISIBLE_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Aborts the CDP handler task when the session goes away.
struct HandlerGuard(JoinHandle<()>);

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub(super) struct RenderSession {
    browser: Browser,
    page: Page,
    context: Option<BrowserContextId>,
    launched: bool,
    _handler: HandlerGuard,
    _profile: Option<TempDir>,
}

impl RenderSession {
    /// Launch or connect to a browser routed through `descriptor`.
    pub(super) async fn open(config: &BrowserConfig, descriptor: &ConnectionDescriptor) -> Result<Self> {
        if descriptor.credentials().is_some() {
            warn!(
                "Browser transport cannot pass proxy credentials; using {} without them",
                descriptor
            );
        }

        match config.remote_url.as_deref() {
            Some(remote_url) => Self::connect_remote(remote_url, descriptor).await,
            None => Self::launch(config, descriptor).await,
        }
    }

    async fn launch(config: &BrowserConfig, descriptor: &ConnectionDescriptor) -> Result<Self> {
        let chrome_path = find_chrome(config.chrome_path.as_deref())?;
        let profile = TempDir::new().context("Failed to create browser profile directory")?;

        info!(
            "Launching browser (headless={}, via {})",
            config.headless, descriptor
        );

        let mut builder = ChromeConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile.path());

        // Set headless mode (with_head means NOT headless, confusingly)
        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(proxy) = chrome_proxy_server(descriptor) {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let chrome_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .context("Failed to launch browser")?;

        let handler = HandlerGuard(tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        }));

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            context: None,
            launched: true,
            _handler: handler,
            _profile: Some(profile),
        })
    }

    async fn connect_remote(url: &str, descriptor: &ConnectionDescriptor) -> Result<Self> {
        info!("Connecting to remote browser at {} (via {})", url, descriptor);

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::builder()
            .no_proxy()
            .build()?
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        let (mut browser, mut handler) = Browser::connect(ws_url)
            .await
            .context("Failed to connect to remote browser")?;

        let handler = HandlerGuard(tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        }));

        let mut context_params = CreateBrowserContextParams::builder().dispose_on_detach(true);
        if let Some(proxy) = chrome_proxy_server(descriptor) {
            context_params = context_params.proxy_server(proxy);
        }
        let context = browser
            .create_browser_context(context_params.build())
            .await
            .context("Failed to create isolated browser context")?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid target params: {}", e))?;
        let page = browser.new_page(target).await?;

        Ok(Self {
            browser,
            page,
            context: Some(context),
            launched: false,
            _handler: handler,
            _profile: None,
        })
    }

    /// Navigate, wait for the page to settle and return its visible text.
    pub(super) async fn render(
        &self,
        url: &str,
        user_agent: &str,
        config: &BrowserConfig,
    ) -> std::result::Result<String, (FailureKind, String)> {
        let page = &self.page;

        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(|e| (FailureKind::Network, format!("user agent override: {}", e)))?;

        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| (FailureKind::Network, format!("invalid URL: {}", e)))?;

        let navigation = page
            .execute(nav_params)
            .await
            .map_err(|e| (FailureKind::Network, format!("navigation: {}", e)))?;
        if let Some(ref error_text) = navigation.result.error_text {
            return Err((classify_net_error(error_text), error_text.clone()));
        }

        match page.evaluate(WAIT_FOR_LOAD_SCRIPT.to_string()).await {
            Ok(result) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Err(e) => debug!("Could not check ready state: {}", e),
        }

        // Let challenge scripts run and redirect
        tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;

        if let Some(ref selector) = config.wait_for_selector {
            debug!("Waiting for selector: {}", selector);
            if let Err(e) = page.find_element(selector.as_str()).await {
                warn!("Selector not found: {}", e);
            }
        }

        let text: String = page
            .evaluate(VISIBLE_TEXT_SCRIPT)
            .await
            .map_err(|e| (FailureKind::Network, format!("text extraction: {}", e)))?
            .into_value()
            .map_err(|e| (FailureKind::Network, format!("text extraction: {}", e)))?;

        Ok(text)
    }

    /// Tear the session down. Never closes a remote browser itself.
    pub(super) async fn close(mut self) {
        let _ = self.page.clone().close().await;

        if let Some(context) = self.context.take() {
            if let Err(e) = self.browser.dispose_browser_context(context).await {
                debug!("Failed to dispose browser context: {}", e);
            }
        }

        if self.launched {
            if let Err(e) = self.browser.close().await {
                debug!("Browser close failed, killing: {}", e);
                let _ = self.browser.kill().await;
            }
            let _ = self.browser.wait().await;
        }
    }
}

/// Proxy server value in the form Chrome understands.
///
/// Chrome has no `socks5h` scheme; it resolves names through SOCKS5 proxies anyway.
fn chrome_proxy_server(descriptor: &ConnectionDescriptor) -> Option<String> {
    match descriptor {
        ConnectionDescriptor::Direct => None,
        ConnectionDescriptor::HttpProxy { host, port, .. } => {
            Some(format!("http://{}:{}", host, port))
        }
        ConnectionDescriptor::Socks5Proxy { host, port } => {
            Some(format!("socks5://{}:{}", host, port))
        }
    }
}

/// Find a Chrome executable.
fn find_chrome(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            debug!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(cmd) {
            debug!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(anyhow::anyhow!(
        "Chrome/Chromium not found. Install it or set CHROME_PATH:\n\
         - Arch/Manjaro: sudo pacman -S chromium\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium"
    ))
}

/// Map a Chrome `net::ERR_*` navigation error onto the failure taxonomy.
pub(super) fn classify_net_error(error_text: &str) -> FailureKind {
    if error_text.contains("PROXY") || error_text.contains("TUNNEL") || error_text.contains("SOCKS") {
        FailureKind::ProxyUnavailable
    } else if error_text.contains("TIMED_OUT") {
        FailureKind::Timeout
    } else {
        FailureKind::Network
    }
}
