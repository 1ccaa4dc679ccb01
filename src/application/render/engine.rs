//! Rendering engine capability consumed by the pipeline.
//!
//! An engine launches processes; a process hands out isolated contexts (one
//! per document). Contexts opened from the same process may be driven
//! concurrently and never share page state.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("failed to launch rendering engine: {0}")]
    Launch(String),
    #[error("failed to open rendering context: {0}")]
    Context(String),
    #[error("failed to load document content: {0}")]
    Content(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("document capture failed: {0}")]
    Capture(String),
    #[error("failed to release engine resource: {0}")]
    Close(String),
}

/// Paper and capture parameters for `capture_pdf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintOptions {
    pub print_background: bool,
    pub landscape: bool,
    /// Uniform margin on all four sides; `None` keeps the engine default.
    pub margin_inches: Option<f64>,
    pub prefer_css_page_size: bool,
    pub scale: Option<f64>,
}

impl PrintOptions {
    /// Attendance sheets: landscape, backgrounds on, 0.2in margins.
    pub const ATTENDANCE: Self = Self {
        print_background: true,
        landscape: true,
        margin_inches: Some(0.2),
        prefer_css_page_size: false,
        scale: None,
    };

    /// Master lists: page size comes from the document's `@page` rule.
    pub const MASTERLIST: Self = Self {
        print_background: true,
        landscape: false,
        margin_inches: None,
        prefer_css_page_size: true,
        scale: Some(0.9),
    };
}

#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Start a new engine process. Each call yields an independent process.
    async fn launch(&self) -> Result<Box<dyn EngineProcess>, EngineError>;
}

#[async_trait]
pub trait EngineProcess: Send + Sync {
    /// Open a fresh, isolated context (a blank page) in this process.
    async fn open_context(&self) -> Result<Box<dyn EngineContext>, EngineError>;

    /// Shut the process down. Contexts must be closed first.
    async fn close(&self) -> Result<(), EngineError>;
}

#[async_trait]
pub trait EngineContext: Send {
    /// Replace the document with the given markup.
    async fn set_content(&mut self, html: &str) -> Result<(), EngineError>;

    /// Wait until an element with `element_id` exists. `Ok(false)` when it
    /// did not appear within `timeout`.
    async fn wait_for_element(
        &mut self,
        element_id: &str,
        timeout: Duration,
    ) -> Result<bool, EngineError>;

    /// Evaluate a script in the context's page.
    async fn evaluate(&mut self, script: &str) -> Result<(), EngineError>;

    async fn capture_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>, EngineError>;

    async fn close(self: Box<Self>) -> Result<(), EngineError>;
}
