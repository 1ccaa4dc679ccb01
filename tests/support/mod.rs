#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use lopdf::{Document, Object, Stream, dictionary};

use rollcall::application::render::{
    BatchRenderer, DocumentMerger, EngineContext, EngineError, EngineProcess, JobTimings,
    MemoryTemplateStore, MergeError, PrintOptions, ROSTER_GLOBAL, RenderEngine, TemplateResolver,
};
use rollcall::domain::roster::{Roster, Student};

/// Students per generated page.
pub const ROWS_PER_PAGE: usize = 10;

pub const DEFAULT_MARKUP: &str = r#"<main data-layout="default"><table><tbody id="attendance-rows"><tr id="student-rows"><td></td><td></td></tr></tbody></table></main>"#;
pub const ADVANCED_MARKUP: &str = r#"<main data-layout="advanced"><script>tamper()</script><table><tbody id="attendance-rows"><tr id="student-rows"><td></td><td></td><td></td></tr></tbody></table></main>"#;
/// Layout without the row anchor.
pub const BARE_MARKUP: &str = r#"<main data-layout="bare"><h1 id="instructor"></h1><p>Sign in at the front desk.</p></main>"#;

/// What one context captured, in capture order.
#[derive(Debug, Clone)]
pub struct Capture {
    pub code: String,
    pub session: String,
    pub markup: String,
    pub rows: usize,
    /// Whether the population routine ran before capture.
    pub populated: bool,
    pub options: PrintOptions,
}

#[derive(Default)]
struct Script {
    /// Codes that fail every attempt.
    persistent: HashSet<String>,
    /// Codes with a number of failing attempts left.
    transient: HashMap<String, usize>,
    /// Per-code capture delays, overriding the engine-wide one.
    delays: HashMap<String, Duration>,
}

#[derive(Default)]
pub struct EngineLog {
    pub launches: AtomicUsize,
    pub contexts: AtomicUsize,
    pub closed_contexts: AtomicUsize,
    pub closed_processes: AtomicUsize,
    captures: Mutex<Vec<Capture>>,
    documents: Mutex<Vec<(String, Vec<u8>)>>,
    script: Mutex<Script>,
}

impl EngineLog {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> usize {
        self.contexts.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> Vec<Capture> {
        self.captures.lock().expect("captures lock").clone()
    }

    /// Captured bytes for the first successful capture of `code`.
    pub fn document_for(&self, code: &str) -> Option<Vec<u8>> {
        self.documents
            .lock()
            .expect("documents lock")
            .iter()
            .find(|(captured, _)| captured == code)
            .map(|(_, bytes)| bytes.clone())
    }

    fn delay_for(&self, code: &str) -> Option<Duration> {
        self.script
            .lock()
            .expect("script lock")
            .delays
            .get(code)
            .copied()
    }

    fn should_fail(&self, code: &str) -> bool {
        let mut script = self.script.lock().expect("script lock");
        if script.persistent.contains(code) {
            return true;
        }
        match script.transient.get_mut(code) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Engine double: every capture yields a real PDF with one labelled page per
/// `ROWS_PER_PAGE` students (`<code>-p<n>`).
#[derive(Clone, Default)]
pub struct FakeEngine {
    pub log: Arc<EngineLog>,
    capture_delay: Duration,
    launch_delay: Duration,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail capture for `code` on every attempt.
    pub fn failing(self, code: &str) -> Self {
        self.log
            .script
            .lock()
            .expect("script lock")
            .persistent
            .insert(code.to_string());
        self
    }

    /// Fail capture for `code` on its first attempt only.
    pub fn failing_once(self, code: &str) -> Self {
        self.log
            .script
            .lock()
            .expect("script lock")
            .transient
            .insert(code.to_string(), 1);
        self
    }

    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    /// Delay capture for `code` only.
    pub fn with_capture_delay_for(self, code: &str, delay: Duration) -> Self {
        self.log
            .script
            .lock()
            .expect("script lock")
            .delays
            .insert(code.to_string(), delay);
        self
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn launch(&self) -> Result<Box<dyn EngineProcess>, EngineError> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        Ok(Box::new(FakeProcess {
            log: self.log.clone(),
            capture_delay: self.capture_delay,
        }))
    }
}

struct FakeProcess {
    log: Arc<EngineLog>,
    capture_delay: Duration,
}

#[async_trait]
impl EngineProcess for FakeProcess {
    async fn open_context(&self) -> Result<Box<dyn EngineContext>, EngineError> {
        self.log.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            log: self.log.clone(),
            capture_delay: self.capture_delay,
            markup: String::new(),
            payload: None,
            populated: false,
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.log.closed_processes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeContext {
    log: Arc<EngineLog>,
    capture_delay: Duration,
    markup: String,
    payload: Option<serde_json::Value>,
    populated: bool,
}

impl FakeContext {
    fn field(&self, key: &str) -> String {
        self.payload
            .as_ref()
            .and_then(|payload| payload[key].as_str())
            .unwrap_or("")
            .to_string()
    }

    fn student_count(&self) -> usize {
        self.payload
            .as_ref()
            .and_then(|payload| payload["students"].as_array())
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl EngineContext for FakeContext {
    async fn set_content(&mut self, html: &str) -> Result<(), EngineError> {
        self.markup = html.to_string();
        Ok(())
    }

    async fn wait_for_element(
        &mut self,
        element_id: &str,
        _timeout: Duration,
    ) -> Result<bool, EngineError> {
        Ok(self.markup.contains(&format!("id=\"{element_id}\"")))
    }

    async fn evaluate(&mut self, script: &str) -> Result<(), EngineError> {
        let prefix = format!("window.{ROSTER_GLOBAL} = ");
        if let Some(json) = script.strip_prefix(&prefix) {
            let value = serde_json::from_str(json.trim_end_matches(';'))
                .map_err(|err| EngineError::Script(err.to_string()))?;
            self.payload = Some(value);
        } else {
            self.populated = true;
        }
        Ok(())
    }

    async fn capture_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        let code = self.field("code");
        let delay = self.log.delay_for(&code).unwrap_or(self.capture_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.log.should_fail(&code) {
            return Err(EngineError::Capture(format!("scripted failure for {code}")));
        }

        let rows = if self.populated {
            self.student_count()
        } else {
            0
        };
        let label = if code.is_empty() { "doc" } else { code.as_str() };
        let bytes = labelled_pdf(label, rows.div_ceil(ROWS_PER_PAGE).max(1));

        self.log.captures.lock().expect("captures lock").push(Capture {
            code: code.clone(),
            session: self.field("session"),
            markup: self.markup.clone(),
            rows,
            populated: self.populated,
            options: *options,
        });
        self.log
            .documents
            .lock()
            .expect("documents lock")
            .push((code, bytes.clone()));
        Ok(bytes)
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.log.closed_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Merger double that counts calls and delegates to lopdf.
#[derive(Default)]
pub struct CountingMerger {
    pub calls: AtomicUsize,
}

impl CountingMerger {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocumentMerger for CountingMerger {
    fn merge(&self, documents: &[Vec<u8>]) -> Result<Vec<u8>, MergeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        rollcall::infra::pdf::LopdfMerger.merge(documents)
    }
}

pub fn resolver() -> TemplateResolver {
    let store = MemoryTemplateStore::new()
        .with_template("SplashFitness", DEFAULT_MARKUP)
        .with_template("Advanced", ADVANCED_MARKUP)
        .with_template("Bare", BARE_MARKUP);
    TemplateResolver::new(Arc::new(store))
}

pub fn fast_timings() -> JobTimings {
    JobTimings {
        job_timeout: Duration::from_secs(5),
        anchor_wait: Duration::from_millis(50),
        settle: Duration::ZERO,
    }
}

pub fn renderer(engine: &FakeEngine) -> BatchRenderer {
    renderer_with(engine, fast_timings())
}

pub fn renderer_with(engine: &FakeEngine, timings: JobTimings) -> BatchRenderer {
    BatchRenderer::new(Arc::new(engine.clone()), resolver()).with_timings(timings)
}

pub fn roster(code: &str, students: usize) -> Roster {
    Roster {
        code: code.to_string(),
        time: "9:00 AM".to_string(),
        instructor: "Coach Kim".to_string(),
        location: "Pool A".to_string(),
        schedule: "Mo,We 06/16/2025 - 07/23/2025".to_string(),
        students: (1..=students)
            .map(|n| Student::named(format!("Student {n}")))
            .collect(),
        ..Roster::default()
    }
}

pub fn labelled_pdf(label: &str, pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let kids: Vec<Object> = (1..=pages)
        .map(|page| {
            let content = format!("BT /F1 12 Tf 72 720 Td ({label}-p{page}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 792.into(), 612.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
                "Contents" => content_id,
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save fixture");
    bytes
}

/// Page labels of a merged document, in page order.
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("load pdf");
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            let content = doc.get_page_content(page_id).expect("page content");
            let text = String::from_utf8_lossy(&content);
            let start = text.find('(').expect("label start") + 1;
            let end = text.find(')').expect("label end");
            text[start..end].to_string()
        })
        .collect()
}
