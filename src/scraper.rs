use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use scraper::Html;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::BrowserConfig;
use crate::utils::error::{AppError, Result};

/// headless_chrome drops the connection after 30s without events by default,
/// which is shorter than a scan interval.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: String,
    pub wait_for_selector: String,
    pub timeout: Duration,
}

/// Snapshot of a page after client-side rendering finished.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    pub response_time_ms: u64,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            response_time_ms: 0,
        }
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Capability for turning a URL into a rendered, selector-queryable DOM.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Navigates, waits for the page to settle and for `wait_for_selector` to
    /// appear. Timeouts surface as `AppError::Fetch`.
    async fn fetch(&self, request: &PageRequest) -> Result<RenderedPage>;

    /// Releases the underlying browser. Further fetches fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct ChromePageFetcher {
    browser: Mutex<Option<Arc<Browser>>>,
    config: BrowserConfig,
}

/// Closes the tab however rendering ends.
struct TabGuard(Arc<Tab>);

impl Deref for TabGuard {
    type Target = Tab;

    fn deref(&self) -> &Tab {
        &self.0
    }
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(true) {
            tracing::debug!("Failed to close tab: {}", e);
        }
    }
}

impl ChromePageFetcher {
    /// Launches the shared browser. Any failure here is fatal for the process.
    pub fn launch(config: BrowserConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
            .args(vec![
                std::ffi::OsStr::new("--no-sandbox"),
                std::ffi::OsStr::new("--disable-dev-shm-usage"),
                std::ffi::OsStr::new("--disable-gpu"),
            ])
            .build()
            .map_err(|e| AppError::FatalInit(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::FatalInit(format!("Failed to launch browser: {}", e)))?;

        tracing::info!(headless = config.headless, "Browser ready");

        Ok(Self {
            browser: Mutex::new(Some(Arc::new(browser))),
            config,
        })
    }

    fn browser(&self) -> Result<Arc<Browser>> {
        let guard = self
            .browser
            .lock()
            .map_err(|_| AppError::Internal("browser lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| AppError::Fetch("browser already closed".to_string()))
    }

    fn render(browser: &Browser, config: &BrowserConfig, request: &PageRequest) -> Result<RenderedPage> {
        let start_time = Instant::now();

        let tab = TabGuard(
            browser
                .new_tab()
                .map_err(|e| AppError::Fetch(format!("Failed to create tab: {}", e)))?,
        );
        tab.set_default_timeout(Duration::from_secs(config.navigation_timeout_secs));

        if let Some(user_agent) = &config.user_agent {
            tab.set_user_agent(user_agent, None, None)
                .map_err(|e| AppError::Fetch(format!("Failed to set user agent: {}", e)))?;
        }

        tab.navigate_to(&request.url)
            .map_err(|e| AppError::Fetch(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| AppError::Fetch(format!("Page load failed: {}", e)))?;

        tab.wait_for_element_with_custom_timeout(&request.wait_for_selector, request.timeout)
            .map_err(|e| {
                AppError::Fetch(format!(
                    "Wait for selector '{}' failed: {}",
                    request.wait_for_selector, e
                ))
            })?;

        let html = tab
            .get_content()
            .map_err(|e| AppError::Fetch(format!("Failed to get page content: {}", e)))?;

        let url = {
            let url = tab.get_url();
            if url.is_empty() { request.url.clone() } else { url }
        };

        Ok(RenderedPage {
            url,
            html,
            response_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl PageFetcher for ChromePageFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<RenderedPage> {
        let browser = self.browser()?;
        let config = self.config.clone();
        let request = request.clone();

        // headless_chrome blocks on CDP round-trips
        tokio::task::spawn_blocking(move || Self::render(&browser, &config, &request))
            .await
            .map_err(|e| AppError::Internal(format!("render task failed: {}", e)))?
    }

    async fn close(&self) -> Result<()> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| AppError::Internal("browser lock poisoned".to_string()))?
            .take();

        if browser.is_some() {
            // Dropping the last handle kills the Chrome process
            drop(browser);
            tracing::info!("Browser closed");
        }
        Ok(())
    }
}
