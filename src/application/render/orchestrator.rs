//! Batch orchestration: a concurrent fast path over one shared engine
//! process, and a sequential fallback with one process per job.

use std::{sync::Arc, time::Duration};

use metrics::{counter, histogram};
use tokio::{
    task::JoinSet,
    time::{Instant, timeout, timeout_at},
};
use tracing::{debug, error, info, warn};

use super::{
    attendance::{JobTimings, render_job_until},
    engine::{EngineError, EngineProcess, RenderEngine},
    templates::TemplateResolver,
    types::{RenderError, RenderJob},
};

pub(crate) const METRIC_BATCHES_TOTAL: &str = "rollcall_render_batches_total";
pub(crate) const METRIC_FALLBACK_TOTAL: &str = "rollcall_render_fallback_total";
pub(crate) const METRIC_FAILURES_TOTAL: &str = "rollcall_render_failures_total";
pub(crate) const METRIC_BATCH_MS: &str = "rollcall_render_batch_ms";

const PROCESS_CLOSE_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Which path produced (or failed) a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    /// Single-document batch rendered in an isolated process.
    Single,
    Concurrent,
    Sequential,
}

impl RenderPath {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderPath::Single => "single",
            RenderPath::Concurrent => "concurrent",
            RenderPath::Sequential => "sequential",
        }
    }
}

/// Renders ordered batches of jobs into ordered documents.
#[derive(Clone)]
pub struct BatchRenderer {
    engine: Arc<dyn RenderEngine>,
    resolver: TemplateResolver,
    timings: JobTimings,
    batch_timeout: Duration,
}

impl BatchRenderer {
    pub fn new(engine: Arc<dyn RenderEngine>, resolver: TemplateResolver) -> Self {
        Self {
            engine,
            resolver,
            timings: JobTimings::default(),
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }

    pub fn with_timings(mut self, timings: JobTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Outer bound on the shared process of the concurrent path.
    pub fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    /// Render every job, returning documents in job order.
    ///
    /// Batches of more than one job try the concurrent path first; any
    /// failure there is logged and the whole batch is re-run sequentially.
    /// Only a sequential failure reaches the caller.
    pub async fn render_batch(&self, jobs: &[RenderJob]) -> Result<Vec<Vec<u8>>, RenderError> {
        if jobs.is_empty() {
            return Err(RenderError::validation("no attendance items provided"));
        }

        let started_at = std::time::Instant::now();
        let (path, result) = if jobs.len() == 1 {
            (RenderPath::Single, self.render_sequential(jobs).await)
        } else {
            match self.render_concurrent(jobs).await {
                Ok(documents) => (RenderPath::Concurrent, Ok(documents)),
                Err(err) => {
                    warn!(
                        target = "application::render::orchestrator",
                        op = "render::concurrent",
                        jobs = jobs.len(),
                        error = %err,
                        "concurrent render failed; retrying batch sequentially"
                    );
                    counter!(METRIC_FAILURES_TOTAL, "path" => RenderPath::Concurrent.as_str())
                        .increment(1);
                    counter!(METRIC_FALLBACK_TOTAL).increment(1);
                    (RenderPath::Sequential, self.render_sequential(jobs).await)
                }
            }
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        counter!(METRIC_BATCHES_TOTAL, "path" => path.as_str()).increment(1);
        histogram!(METRIC_BATCH_MS, "path" => path.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(_) => info!(
                target = "application::render::orchestrator",
                op = "render::batch",
                jobs = jobs.len(),
                path = path.as_str(),
                result = "ok",
                elapsed_ms,
                "attendance batch rendered"
            ),
            Err(err) => {
                counter!(METRIC_FAILURES_TOTAL, "path" => path.as_str()).increment(1);
                error!(
                    target = "application::render::orchestrator",
                    op = "render::batch",
                    jobs = jobs.len(),
                    path = path.as_str(),
                    result = "error",
                    position = err.position(),
                    error = %err,
                    elapsed_ms,
                    "attendance batch failed"
                );
            }
        }

        result
    }

    /// Run every job in parallel under one shared process.
    ///
    /// Waits for all jobs before deciding the outcome; siblings are never
    /// cancelled because one of them failed. Fails if any job failed, if a
    /// task was lost, or if the batch outlived its outer bound.
    ///
    /// The outer bound starts before the launch. No job runs past it, and
    /// every job still closes its own context once it has passed.
    pub async fn render_concurrent(
        &self,
        jobs: &[RenderJob],
    ) -> Result<Vec<Vec<u8>>, RenderError> {
        let batch_timed_out = || RenderError::Timeout {
            limit: self.batch_timeout,
        };
        let deadline = Instant::now() + self.batch_timeout;
        let process: Arc<dyn EngineProcess> = Arc::from(
            timeout_at(deadline, self.engine.launch())
                .await
                .map_err(|_| batch_timed_out())??,
        );

        let mut tasks = JoinSet::new();
        for (slot, job) in jobs.iter().cloned().enumerate() {
            let process = Arc::clone(&process);
            let timings = self.timings;
            let job_deadline = (Instant::now() + timings.job_timeout).min(deadline);
            tasks.spawn(async move {
                let result = render_job_until(process.as_ref(), &job, &timings, job_deadline)
                    .await
                    .map_err(|err| err.at(job.index));
                (slot, result)
            });
        }

        let mut slots: Vec<Option<Result<Vec<u8>, RenderError>>> =
            (0..jobs.len()).map(|_| None).collect();
        let mut lost: Option<RenderError> = None;

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((slot, result)))) => slots[slot] = Some(result),
                Ok(Some(Err(join_err))) => {
                    if lost.is_none() {
                        lost = Some(
                            EngineError::Context(format!("render task failed: {join_err}")).into(),
                        );
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // Jobs are past their own deadline by now and only have
                    // their context close left to run.
                    while tasks.join_next().await.is_some() {}
                    lost = Some(batch_timed_out());
                    break;
                }
            }
        }

        release_process(process.as_ref(), RenderPath::Concurrent).await;

        if let Some(err) = lost {
            return Err(err);
        }

        let mut documents = Vec::with_capacity(slots.len());
        for (slot, outcome) in slots.into_iter().enumerate() {
            match outcome {
                Some(Ok(document)) => documents.push(document),
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(RenderError::from(EngineError::Context(
                        "render task produced no result".into(),
                    ))
                    .at(jobs[slot].index));
                }
            }
        }
        Ok(documents)
    }

    /// Run jobs one at a time, each in a freshly launched process.
    ///
    /// Templates are resolved again before each job. Stops at the first
    /// failure and reports its 1-based position.
    pub async fn render_sequential(
        &self,
        jobs: &[RenderJob],
    ) -> Result<Vec<Vec<u8>>, RenderError> {
        let mut documents = Vec::with_capacity(jobs.len());
        for job in jobs {
            let template = self
                .resolver
                .resolve(&job.template.requested)
                .map_err(|err| err.at(job.index))?;
            let job = RenderJob {
                template,
                ..job.clone()
            };
            let document = self
                .render_isolated(&job)
                .await
                .map_err(|err| err.at(job.index))?;
            documents.push(document);
        }
        Ok(documents)
    }

    /// One job in its own process. The job timeout covers the launch too.
    async fn render_isolated(&self, job: &RenderJob) -> Result<Vec<u8>, RenderError> {
        let deadline = Instant::now() + self.timings.job_timeout;
        let process = timeout_at(deadline, self.engine.launch())
            .await
            .map_err(|_| RenderError::Timeout {
                limit: self.timings.job_timeout,
            })??;
        let result = render_job_until(process.as_ref(), job, &self.timings, deadline).await;
        release_process(process.as_ref(), RenderPath::Sequential).await;
        result
    }
}

async fn release_process(process: &dyn EngineProcess, path: RenderPath) {
    match timeout(PROCESS_CLOSE_GRACE, process.close()).await {
        Ok(Ok(())) => debug!(
            target = "application::render::orchestrator",
            op = "render::release",
            path = path.as_str(),
            "engine process closed"
        ),
        Ok(Err(err)) => warn!(
            target = "application::render::orchestrator",
            op = "render::release",
            path = path.as_str(),
            error = %err,
            "failed to close engine process"
        ),
        Err(_) => warn!(
            target = "application::render::orchestrator",
            op = "render::release",
            path = path.as_str(),
            "engine process did not close in time"
        ),
    }
}
