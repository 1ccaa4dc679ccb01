use std::{sync::Arc, time::Duration};

use serde::Serialize;
use thiserror::Error;

use crate::domain::roster::{Roster, Student};

use super::{engine::EngineError, merge::MergeError, templates::TemplateStoreError};

/// Session label used when a request leaves it blank.
pub const DEFAULT_SESSION: &str = "Summer 2025";

/// Structured errors surfaced by the attendance pipeline.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("attendance template `{name}` not found")]
    TemplateNotFound { name: String },
    #[error("template store failure: {message}")]
    TemplateStore { message: String },
    #[error("render timed out after {}ms", .limit.as_millis())]
    Timeout { limit: Duration },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// Failure attributed to one batch entry. `position` is 1-based.
    #[error("item {position}: {source}")]
    Job {
        position: usize,
        #[source]
        source: Box<RenderError>,
    },
}

impl RenderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Attach a 0-based batch index, reported 1-based.
    pub fn at(self, index: usize) -> Self {
        Self::Job {
            position: index + 1,
            source: Box::new(self),
        }
    }

    /// 1-based position of the failing entry, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            RenderError::Job { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// The innermost cause with positional wrappers removed.
    pub fn root(&self) -> &RenderError {
        match self {
            RenderError::Job { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<TemplateStoreError> for RenderError {
    fn from(err: TemplateStoreError) -> Self {
        Self::TemplateStore {
            message: err.to_string(),
        }
    }
}

/// One requested document before validation.
#[derive(Debug, Clone, Default)]
pub struct AttendanceItem {
    pub template: String,
    pub roster: Option<Roster>,
}

/// Ordered batch of attendance documents sharing one session label.
#[derive(Debug, Clone, Default)]
pub struct AttendanceBatch {
    pub session: Option<String>,
    pub filename: Option<String>,
    pub items: Vec<AttendanceItem>,
}

/// Template markup resolved for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    /// Name the caller asked for.
    pub requested: String,
    /// Name of the markup actually used; differs on fallback.
    pub name: String,
    pub markup: Arc<str>,
}

impl ResolvedTemplate {
    pub fn is_fallback(&self) -> bool {
        self.requested != self.name
    }
}

/// One validated unit of work. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// 0-based position in the submitted batch.
    pub index: usize,
    pub template: ResolvedTemplate,
    pub roster: Arc<Roster>,
    pub session: Arc<str>,
}

/// Data handed to the page's population script.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPayload<'a> {
    pub code: &'a str,
    pub time: &'a str,
    pub instructor: &'a str,
    pub location: &'a str,
    pub schedule: &'a str,
    pub session: &'a str,
    pub start_time: String,
    pub students: Vec<PayloadStudent<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadStudent<'a> {
    pub name: &'a str,
}

impl<'a> RenderPayload<'a> {
    pub fn new(roster: &'a Roster, session: &'a str) -> Self {
        Self {
            code: &roster.code,
            time: &roster.time,
            instructor: &roster.instructor,
            location: &roster.location,
            schedule: &roster.schedule,
            session,
            start_time: roster.start_time_display(),
            students: roster
                .students
                .iter()
                .map(|Student { name, .. }| PayloadStudent { name })
                .collect(),
        }
    }
}
