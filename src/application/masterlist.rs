//! Master-list rendering: one table for many rosters, one isolated process.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{info, warn};

use crate::config::RenderSettings;
use crate::domain::{
    filename::masterlist_filename,
    masterlist::{MASTERLIST_TABLE_ID, MasterListOptions, build_markup, build_rows},
    roster::Roster,
};

use super::{
    attendance::RenderedDocument,
    render::{EngineContext, EngineError, EngineProcess, PrintOptions, RenderEngine, RenderError},
};

const RELEASE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct MasterListTimings {
    /// Ceiling for the whole render, launch included.
    pub timeout: Duration,
    pub settle: Duration,
}

impl Default for MasterListTimings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            settle: Duration::from_millis(400),
        }
    }
}

impl From<&RenderSettings> for MasterListTimings {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            timeout: settings.masterlist_timeout,
            settle: settings.masterlist_settle,
        }
    }
}

#[derive(Clone)]
pub struct MasterListService {
    engine: Arc<dyn RenderEngine>,
    timings: MasterListTimings,
}

impl MasterListService {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            engine,
            timings: MasterListTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: MasterListTimings) -> Self {
        self.timings = timings;
        self
    }

    pub async fn render(
        &self,
        rosters: &[Roster],
        options: &MasterListOptions,
    ) -> Result<RenderedDocument, RenderError> {
        self.render_at(rosters, options, OffsetDateTime::now_utc())
            .await
    }

    /// Render with an explicit timestamp for the output name.
    pub async fn render_at(
        &self,
        rosters: &[Roster],
        options: &MasterListOptions,
        now: OffsetDateTime,
    ) -> Result<RenderedDocument, RenderError> {
        let rows =
            build_rows(rosters, options).map_err(|err| RenderError::validation(err.to_string()))?;
        let markup = build_markup(&rows, options);

        let started_at = std::time::Instant::now();
        let deadline = Instant::now() + self.timings.timeout;
        let timed_out = || RenderError::Timeout {
            limit: self.timings.timeout,
        };

        let process = timeout_at(deadline, self.engine.launch())
            .await
            .map_err(|_| timed_out())??;
        let result = match timeout_at(deadline, self.capture(process.as_ref(), &markup, deadline))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        };
        release(process.as_ref()).await;

        info!(
            target = "application::masterlist",
            op = "masterlist::render",
            rosters = rosters.len(),
            rows = rows.len(),
            result = if result.is_ok() { "ok" } else { "error" },
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "master list rendered"
        );

        Ok(RenderedDocument {
            filename: masterlist_filename(now),
            bytes: result?,
        })
    }

    async fn capture(
        &self,
        process: &dyn EngineProcess,
        markup: &str,
        deadline: Instant,
    ) -> Result<Vec<u8>, RenderError> {
        let mut context = process.open_context().await?;
        let result = self.capture_in(context.as_mut(), markup, deadline).await;
        if let Err(err) = context.close().await {
            warn!(
                target = "application::masterlist",
                op = "masterlist::close_context",
                error = %err,
                "failed to close rendering context"
            );
        }
        result
    }

    async fn capture_in(
        &self,
        context: &mut dyn EngineContext,
        markup: &str,
        deadline: Instant,
    ) -> Result<Vec<u8>, RenderError> {
        context.set_content(markup).await?;

        let wait = deadline.saturating_duration_since(Instant::now());
        if !context.wait_for_element(MASTERLIST_TABLE_ID, wait).await? {
            return Err(EngineError::Content(format!(
                "element `{MASTERLIST_TABLE_ID}` never appeared"
            ))
            .into());
        }

        tokio::time::sleep(self.timings.settle).await;

        let document = context.capture_pdf(&PrintOptions::MASTERLIST).await?;
        if document.is_empty() {
            return Err(EngineError::Capture("engine returned an empty document".into()).into());
        }
        Ok(document)
    }
}

async fn release(process: &dyn EngineProcess) {
    match timeout(RELEASE_GRACE, process.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(
            target = "application::masterlist",
            op = "masterlist::release",
            error = %err,
            "failed to close engine process"
        ),
        Err(_) => warn!(
            target = "application::masterlist",
            op = "masterlist::release",
            "engine process did not close in time"
        ),
    }
}
