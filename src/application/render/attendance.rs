//! Per-job attendance renderer.
//!
//! Template markup is loaded with every `<script>` removed; the roster
//! travels separately as a JSON value assigned to a page global and is then
//! applied by a fixed population routine. Template authors therefore never
//! get a channel to run script, and roster text is never parsed as markup.

use std::time::{Duration, Instant};

use lol_html::{RewriteStrSettings, element, rewrite_str};
use tokio::time::{Instant as TokioInstant, timeout, timeout_at};
use tracing::{debug, warn};

use crate::config::RenderSettings;

use super::{
    engine::{EngineContext, EngineError, EngineProcess, PrintOptions},
    types::{RenderError, RenderJob, RenderPayload},
};

/// Table body that receives one row per student.
pub const ANCHOR_ELEMENT_ID: &str = "attendance-rows";
/// Page global holding the serialized roster.
pub const ROSTER_GLOBAL: &str = "__ROSTER__";

const CONTEXT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Fills the attendance template from `window.__ROSTER__`.
///
/// Keeps the prototype row (`#student-rows`), removes any other rows, then
/// appends one row per student with `columns - 1` blank tracking cells.
pub const POPULATE_ATTENDANCE_SCRIPT: &str = r#"(function () {
  const roster = window.__ROSTER__;
  if (!roster) {
    return;
  }

  const setText = (id, value) => {
    const el = document.getElementById(id);
    if (el) {
      el.textContent = value || '';
    }
  };

  if (roster.instructor) {
    document.title = roster.instructor;
  }
  setText('instructor', roster.instructor);
  setText('start_time', roster.startTime);
  setText('session', roster.session);
  setText('location', roster.location);
  setText('barcode', roster.code);

  const body = document.getElementById('attendance-rows');
  if (!body) {
    return;
  }

  const prototypeRow = document.getElementById('student-rows');
  const columns = prototypeRow ? prototypeRow.children.length : 1;
  const blankCells = Math.max(columns - 1, 0);

  Array.from(body.querySelectorAll('tr')).forEach(row => {
    if (row !== prototypeRow) {
      row.parentNode.removeChild(row);
    }
  });

  (roster.students || []).forEach((student, index) => {
    const row = document.createElement('tr');
    const nameCell = document.createElement('td');

    const label = document.createElement('strong');
    label.style.fontFamily = 'Arial';
    label.textContent = (index + 1) + '. ' + (student.name || '');
    nameCell.appendChild(label);

    const legend = document.createElement('font');
    legend.size = '2';
    legend.appendChild(document.createElement('br'));
    legend.appendChild(document.createTextNode('Absent/Present'));
    legend.appendChild(document.createElement('br'));
    const days = document.createElement('span');
    days.style.color = 'rgb(191, 191, 191)';
    days.textContent = Array.from({ length: 14 }, (_, day) => '[Day ' + (day + 1) + ']').join(' ');
    legend.appendChild(days);
    nameCell.appendChild(legend);
    row.appendChild(nameCell);

    for (let i = 0; i < blankCells; i += 1) {
      const cell = document.createElement('td');
      cell.textContent = '\u00a0';
      row.appendChild(cell);
    }

    body.appendChild(row);
  });
})();"#;

/// Timing knobs shared by every job of a batch.
#[derive(Debug, Clone, Copy)]
pub struct JobTimings {
    /// Ceiling for one job, measured from the moment its context is requested.
    pub job_timeout: Duration,
    pub anchor_wait: Duration,
    pub settle: Duration,
}

impl Default for JobTimings {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(25),
            anchor_wait: Duration::from_secs(5),
            settle: Duration::from_millis(200),
        }
    }
}

impl From<&RenderSettings> for JobTimings {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            job_timeout: settings.job_timeout,
            anchor_wait: settings.anchor_wait,
            settle: settings.settle,
        }
    }
}

/// Remove every `<script>` element, content included.
pub fn strip_scripts(markup: &str) -> Result<String, RenderError> {
    rewrite_str(
        markup,
        RewriteStrSettings {
            element_content_handlers: vec![element!("script", |el| {
                el.remove();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Engine(EngineError::Content(err.to_string())))
}

/// Statement assigning the roster payload to the page global.
pub fn payload_script(job: &RenderJob) -> Result<String, RenderError> {
    let payload = serde_json::to_string(&RenderPayload::new(&job.roster, &job.session))
        .map_err(|err| RenderError::Engine(EngineError::Script(err.to_string())))?;
    Ok(format!("window.{ROSTER_GLOBAL} = {payload};"))
}

/// Drive one already-open context through the attendance steps.
pub async fn render_in_context(
    context: &mut dyn EngineContext,
    job: &RenderJob,
    timings: &JobTimings,
) -> Result<Vec<u8>, RenderError> {
    let markup = strip_scripts(&job.template.markup)?;
    let payload = payload_script(job)?;

    context.set_content(&markup).await?;
    context.evaluate(&payload).await?;

    if context
        .wait_for_element(ANCHOR_ELEMENT_ID, timings.anchor_wait)
        .await?
    {
        context.evaluate(POPULATE_ATTENDANCE_SCRIPT).await?;
    } else {
        warn!(
            target = "application::render::attendance",
            op = "attendance::populate",
            position = job.index + 1,
            template = %job.template.name,
            anchor = ANCHOR_ELEMENT_ID,
            "anchor element missing; capturing template without student rows"
        );
    }

    tokio::time::sleep(timings.settle).await;

    let document = context.capture_pdf(&PrintOptions::ATTENDANCE).await?;
    if document.is_empty() {
        return Err(EngineError::Capture("engine returned an empty document".into()).into());
    }
    Ok(document)
}

/// Open a context in `process`, render `job` under its own deadline, and
/// always close the context before returning.
pub async fn render_job(
    process: &dyn EngineProcess,
    job: &RenderJob,
    timings: &JobTimings,
) -> Result<Vec<u8>, RenderError> {
    render_job_until(process, job, timings, TokioInstant::now() + timings.job_timeout).await
}

/// Like [`render_job`], but against a deadline the caller already started,
/// e.g. one that also covered launching `process`.
pub async fn render_job_until(
    process: &dyn EngineProcess,
    job: &RenderJob,
    timings: &JobTimings,
    deadline: TokioInstant,
) -> Result<Vec<u8>, RenderError> {
    let started_at = Instant::now();
    let timed_out = || RenderError::Timeout {
        limit: timings.job_timeout,
    };

    let mut context = timeout_at(deadline, process.open_context())
        .await
        .map_err(|_| timed_out())??;

    let outcome = match timeout_at(deadline, render_in_context(context.as_mut(), job, timings)).await
    {
        Ok(result) => result,
        Err(_) => Err(timed_out()),
    };

    match timeout(CONTEXT_CLOSE_GRACE, context.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(
            target = "application::render::attendance",
            op = "attendance::close_context",
            position = job.index + 1,
            error = %err,
            "failed to close rendering context"
        ),
        Err(_) => warn!(
            target = "application::render::attendance",
            op = "attendance::close_context",
            position = job.index + 1,
            "rendering context did not close in time"
        ),
    }

    debug!(
        target = "application::render::attendance",
        op = "attendance::render_job",
        position = job.index + 1,
        template = %job.template.name,
        students = job.roster.students.len(),
        result = if outcome.is_ok() { "ok" } else { "error" },
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "attendance job finished"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::application::render::types::ResolvedTemplate;
    use crate::domain::roster::{Roster, Student};

    #[test]
    fn strips_script_blocks_and_keeps_layout() {
        let markup = r#"<html><head><script src="x.js"></script><script>alert(1)</script></head><body><table id="attendance-rows"><tr id="student-rows"><td>Name</td></tr></table><script type="module">steal()</script></body></html>"#;
        let clean = strip_scripts(markup).expect("rewrite");
        assert!(!clean.contains("<script"));
        assert!(!clean.contains("alert(1)"));
        assert!(!clean.contains("steal()"));
        assert!(clean.contains(r#"<tr id="student-rows"><td>Name</td></tr>"#));
    }

    #[test]
    fn payload_is_assigned_as_data_not_markup() {
        let job = RenderJob {
            index: 0,
            template: ResolvedTemplate {
                requested: "Advanced".into(),
                name: "Advanced".into(),
                markup: Arc::from("<p></p>"),
            },
            roster: Arc::new(Roster {
                code: "A-1".into(),
                students: vec![Student::named("</script><script>alert(1)</script>")],
                ..Roster::default()
            }),
            session: Arc::from("Fall"),
        };

        let script = payload_script(&job).expect("payload");
        assert!(script.starts_with("window.__ROSTER__ = {"));
        assert!(script.ends_with("};"));
        let json = script
            .trim_start_matches("window.__ROSTER__ = ")
            .trim_end_matches(';');
        let value: serde_json::Value = serde_json::from_str(json).expect("json literal");
        assert_eq!(value["students"][0]["name"], "</script><script>alert(1)</script>");
    }
}
