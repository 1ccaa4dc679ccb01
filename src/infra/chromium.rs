//! Headless Chrome rendering engine over the DevTools protocol.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chromiumoxide::{
    Browser, BrowserConfig, Page,
    cdp::{browser_protocol::page::PrintToPdfParams, js_protocol::runtime::EvaluateParams},
};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

use crate::application::render::{
    EngineContext, EngineError, EngineProcess, PrintOptions, RenderEngine,
};

const WINDOW_WIDTH: u32 = 1400;
const WINDOW_HEIGHT: u32 = 900;
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const CHROME_PATH_ENV: &str = "CHROME_PATH";
const CHROME_BINARIES: [&str; 3] = ["google-chrome", "chromium", "chromium-browser"];
const MACOS_BUNDLES: [&str; 2] = [
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Locate a Chrome binary: explicit setting, then `CHROME_PATH`, then the
/// usual binary names on `PATH`, then macOS application bundles.
pub fn resolve_chrome_path(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }

    if let Some(value) = std::env::var_os(CHROME_PATH_ENV)
        && !value.is_empty()
    {
        return Some(PathBuf::from(value));
    }

    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            for binary in CHROME_BINARIES {
                let candidate = dir.join(binary);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }

    MACOS_BUNDLES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}

/// Launches one headless browser per [`RenderEngine::launch`] call.
#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine {
    executable: Option<PathBuf>,
}

impl ChromiumEngine {
    /// `None` leaves executable discovery to the browser driver.
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Box<dyn EngineProcess>, EngineError> {
        let started_at = std::time::Instant::now();
        let profile = tempfile::Builder::new()
            .prefix("rollcall-chrome-")
            .tempdir()
            .map_err(|err| EngineError::Launch(format!("failed to create profile dir: {err}")))?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .viewport(None)
            .user_data_dir(profile.path());
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(EngineError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| EngineError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        debug!(
            target = "infra::chromium",
            op = "chromium::launch",
            executable = self
                .executable
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "auto".to_string()),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "browser launched"
        );

        Ok(Box::new(ChromiumProcess {
            browser: RwLock::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
            _profile: profile,
        }))
    }
}

struct ChromiumProcess {
    browser: RwLock<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    _profile: TempDir,
}

#[async_trait]
impl EngineProcess for ChromiumProcess {
    async fn open_context(&self) -> Result<Box<dyn EngineContext>, EngineError> {
        let guard = self.browser.read().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| EngineError::Context("browser already closed".into()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| EngineError::Context(err.to_string()))?;
        Ok(Box::new(ChromiumContext { page }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        let Some(mut browser) = self.browser.write().await.take() else {
            return Ok(());
        };

        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|err| EngineError::Close(err.to_string()));
        if let Err(err) = browser.wait().await {
            warn!(
                target = "infra::chromium",
                op = "chromium::close",
                error = %err,
                "browser process did not exit cleanly"
            );
        }

        if let Some(handle) = self.handler.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        closed
    }
}

struct ChromiumContext {
    page: Page,
}

#[async_trait]
impl EngineContext for ChromiumContext {
    async fn set_content(&mut self, html: &str) -> Result<(), EngineError> {
        self.page
            .set_content(html)
            .await
            .map(|_| ())
            .map_err(|err| EngineError::Content(err.to_string()))
    }

    async fn wait_for_element(
        &mut self,
        element_id: &str,
        timeout: Duration,
    ) -> Result<bool, EngineError> {
        let id_literal =
            serde_json::to_string(element_id).map_err(|err| EngineError::Script(err.to_string()))?;
        let present_check = format!("document.getElementById({id_literal}) !== null");
        let deadline = Instant::now() + timeout;

        loop {
            let present: bool = self
                .page
                .evaluate_expression(EvaluateParams::new(present_check.clone()))
                .await
                .map_err(|err| EngineError::Script(err.to_string()))?
                .into_value()
                .map_err(|err| EngineError::Script(err.to_string()))?;
            if present {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<(), EngineError> {
        self.page
            .evaluate_expression(EvaluateParams::new(script))
            .await
            .map(|_| ())
            .map_err(|err| EngineError::Script(err.to_string()))
    }

    async fn capture_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        self.page
            .pdf(print_params(options))
            .await
            .map_err(|err| EngineError::Capture(err.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.page
            .close()
            .await
            .map_err(|err| EngineError::Close(err.to_string()))
    }
}

fn print_params(options: &PrintOptions) -> PrintToPdfParams {
    PrintToPdfParams {
        print_background: Some(options.print_background),
        landscape: Some(options.landscape),
        margin_top: options.margin_inches,
        margin_bottom: options.margin_inches,
        margin_left: options.margin_inches,
        margin_right: options.margin_inches,
        prefer_css_page_size: Some(options.prefer_css_page_size),
        scale: options.scale,
        ..PrintToPdfParams::default()
    }
}
