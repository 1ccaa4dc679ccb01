use std::{path::PathBuf, process, sync::Arc};

use rollcall::{
    application::{
        attendance::{AttendanceRequest, AttendanceService, RenderedDocument},
        concat::ConcatService,
        error::AppError,
        masterlist::{MasterListService, MasterListTimings},
        render::{BatchRenderer, DocumentMerger, JobTimings, RenderEngine, TemplateResolver},
    },
    config,
    infra::{
        chromium::{ChromiumEngine, resolve_chrome_path},
        error::InfraError,
        http::{self, AppState},
        pdf::LopdfMerger,
        telemetry,
        templates::FsTemplateStore,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
        config::Command::Concat(args) => run_concat(args).await,
    }
}

struct ApplicationContext {
    attendance: Arc<AttendanceService>,
    concat: Arc<ConcatService>,
    masterlist: Arc<MasterListService>,
}

fn build_application_context(settings: &config::RenderSettings) -> ApplicationContext {
    let store = FsTemplateStore::locate(&settings.templates_dir);
    info!(
        target = "rollcall::startup",
        templates_dir = %store.root().display(),
        default_layout = %settings.default_layout,
        "template store ready"
    );

    let chrome_path = resolve_chrome_path(settings.chrome_path.as_deref());
    if chrome_path.is_none() {
        warn!(
            target = "rollcall::startup",
            "no Chrome executable found; relying on the engine's own discovery"
        );
    }

    let engine: Arc<dyn RenderEngine> = Arc::new(ChromiumEngine::new(chrome_path));
    let merger: Arc<dyn DocumentMerger> = Arc::new(LopdfMerger);
    let resolver =
        TemplateResolver::with_default_layout(Arc::new(store), settings.default_layout.clone());

    let renderer = BatchRenderer::new(engine.clone(), resolver)
        .with_timings(JobTimings::from(settings))
        .with_batch_timeout(settings.batch_timeout);

    ApplicationContext {
        attendance: Arc::new(
            AttendanceService::new(renderer, merger.clone())
                .with_default_session(settings.default_session.clone()),
        ),
        concat: Arc::new(ConcatService::new(merger)),
        masterlist: Arc::new(
            MasterListService::new(engine).with_timings(MasterListTimings::from(settings)),
        ),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings.render);
    let state = AppState {
        attendance: app.attendance,
        concat: app.concat,
        masterlist: app.masterlist,
    };

    let body_limit = settings.server.max_request_bytes.get() as usize;
    let router = http::build_router(state, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "rollcall::serve",
        addr = %settings.server.addr,
        max_request_bytes = body_limit,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!(target = "rollcall::serve", "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!(target = "rollcall::serve", "shutdown requested");
            let _ = stop_tx.send(());
        });

    let mut server = std::pin::pin!(server.into_future());
    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            let _ = stop_rx.await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "rollcall::serve",
                grace_secs = grace.as_secs(),
                "in-flight requests did not finish within the shutdown grace period"
            );
        }
    }

    Ok(())
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let raw = tokio::fs::read(&args.request)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let request: AttendanceRequest = serde_json::from_slice(&raw).map_err(|err| {
        AppError::validation(format!(
            "invalid request file {}: {err}",
            args.request.display()
        ))
    })?;

    let app = build_application_context(&settings.render);
    let document = app.attendance.render(request.into_batch()).await?;
    write_document(document, args.output).await
}

async fn run_concat(args: config::ConcatArgs) -> Result<(), AppError> {
    let mut documents = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;
        documents.push(bytes);
    }

    let service = ConcatService::new(Arc::new(LopdfMerger));
    let document = service.concat(documents, None)?;
    write_document(document, args.output).await
}

async fn write_document(
    document: RenderedDocument,
    output: Option<PathBuf>,
) -> Result<(), AppError> {
    let path = output.unwrap_or_else(|| PathBuf::from(&document.filename));
    tokio::fs::write(&path, &document.bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "rollcall::cli",
        path = %path.display(),
        bytes = document.bytes.len(),
        "document written"
    );
    Ok(())
}
