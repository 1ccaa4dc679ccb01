//! Roster-to-document rendering pipeline.
//!
//! Batches are validated and resolved into jobs before any engine resource
//! exists, rendered through the [`BatchRenderer`] (concurrent first,
//! sequential on failure), and finally merged in submission order.

mod attendance;
mod engine;
mod jobs;
mod merge;
mod orchestrator;
mod templates;
mod types;

pub use attendance::{
    ANCHOR_ELEMENT_ID, JobTimings, POPULATE_ATTENDANCE_SCRIPT, ROSTER_GLOBAL, payload_script,
    render_in_context, render_job, render_job_until, strip_scripts,
};
pub use engine::{EngineContext, EngineError, EngineProcess, PrintOptions, RenderEngine};
pub use jobs::{build_jobs, effective_session};
pub use merge::{DocumentMerger, MergeError, merge_documents};
pub use orchestrator::{BatchRenderer, RenderPath};
pub use templates::{
    DEFAULT_LAYOUT, MemoryTemplateStore, TemplateResolver, TemplateStore, TemplateStoreError,
};
pub use types::{
    AttendanceBatch, AttendanceItem, DEFAULT_SESSION, PayloadStudent, RenderError, RenderJob,
    RenderPayload, ResolvedTemplate,
};

pub(crate) use orchestrator::{
    METRIC_BATCH_MS, METRIC_BATCHES_TOTAL, METRIC_FAILURES_TOTAL, METRIC_FALLBACK_TOTAL,
};
