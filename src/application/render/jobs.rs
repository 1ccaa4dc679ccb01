use std::sync::Arc;

use super::{
    templates::TemplateResolver,
    types::{AttendanceBatch, DEFAULT_SESSION, RenderError, RenderJob},
};

/// Session label for a batch: trimmed, or the default when blank.
pub fn effective_session(session: Option<&str>) -> &str {
    match session.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => DEFAULT_SESSION,
    }
}

/// Validate a batch and resolve its templates, preserving submission order.
///
/// Runs entirely before any engine resource exists; the first invalid entry
/// fails the whole batch with its 1-based position.
pub fn build_jobs(
    batch: &AttendanceBatch,
    resolver: &TemplateResolver,
) -> Result<Vec<RenderJob>, RenderError> {
    if batch.items.is_empty() {
        return Err(RenderError::validation("no attendance items provided"));
    }

    let session: Arc<str> = Arc::from(effective_session(batch.session.as_deref()));

    batch
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let template_name = item.template.trim();
            if template_name.is_empty() {
                return Err(RenderError::validation("missing attendance template").at(index));
            }
            let roster = item
                .roster
                .as_ref()
                .ok_or_else(|| RenderError::validation("missing roster").at(index))?;
            let template = resolver
                .resolve(template_name)
                .map_err(|err| err.at(index))?;

            Ok(RenderJob {
                index,
                template,
                roster: Arc::new(roster.clone()),
                session: Arc::clone(&session),
            })
        })
        .collect()
}
