//! Attendance batch service: jobs, rendering, merge and naming.

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::{
    filename::{AttendanceNameParts, attendance_filename},
    roster::Roster,
};

use super::render::{
    AttendanceBatch, AttendanceItem, BatchRenderer, DEFAULT_SESSION, DocumentMerger, RenderError,
    build_jobs, merge_documents,
};

/// Wire shape of an attendance request, shared by the HTTP body and the
/// `render` command's request file.
///
/// When `rosters` is empty the single `template` + `roster` form is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceRequest {
    pub session: Option<String>,
    pub filename: Option<String>,
    pub template: Option<String>,
    pub roster: Option<Roster>,
    pub rosters: Vec<AttendanceRequestItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceRequestItem {
    pub template: String,
    pub roster: Option<Roster>,
}

impl AttendanceRequest {
    pub fn into_batch(self) -> AttendanceBatch {
        let items = if self.rosters.is_empty() {
            vec![AttendanceItem {
                template: self.template.unwrap_or_default(),
                roster: self.roster,
            }]
        } else {
            self.rosters
                .into_iter()
                .map(|item| AttendanceItem {
                    template: item.template,
                    roster: item.roster,
                })
                .collect()
        };

        AttendanceBatch {
            session: self.session,
            filename: self.filename,
            items,
        }
    }
}

/// A finished document ready to be handed back to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct AttendanceService {
    renderer: BatchRenderer,
    merger: Arc<dyn DocumentMerger>,
    default_session: String,
}

impl AttendanceService {
    pub fn new(renderer: BatchRenderer, merger: Arc<dyn DocumentMerger>) -> Self {
        Self {
            renderer,
            merger,
            default_session: DEFAULT_SESSION.to_string(),
        }
    }

    pub fn with_default_session(mut self, session: impl Into<String>) -> Self {
        self.default_session = session.into();
        self
    }

    /// Render the batch into a single document named after the batch.
    pub async fn render(&self, mut batch: AttendanceBatch) -> Result<RenderedDocument, RenderError> {
        if batch
            .session
            .as_deref()
            .is_none_or(|session| session.trim().is_empty())
        {
            batch.session = Some(self.default_session.clone());
        }

        let jobs = build_jobs(&batch, self.renderer.resolver())?;
        let documents = self.renderer.render_batch(&jobs).await?;
        let bytes = merge_documents(self.merger.as_ref(), documents)?;

        Ok(RenderedDocument {
            filename: derive_filename(&batch),
            bytes,
        })
    }
}

/// Output name for a batch: explicit name, else the first roster's code,
/// else the first template name.
pub fn derive_filename(batch: &AttendanceBatch) -> String {
    let first = batch.items.first();
    attendance_filename(AttendanceNameParts {
        requested: batch.filename.as_deref(),
        primary_code: first
            .and_then(|item| item.roster.as_ref())
            .map(|roster| roster.code.as_str()),
        template: first.map(|item| item.template.as_str()),
    })
}
