mod cli;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use rendershot_lib::{
    build_router, telemetry, AppState, ChromiumLauncher, RenderError, RenderPipeline,
    RendererPool, TemplateLibrary,
};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // The subscriber may not be installed yet.
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), RenderError> {
    let args = cli::parse();
    let config = settings::load_serve_config(&args)?;
    telemetry::init(&config.logging, args.verbose)?;
    debug!("{}", settings::format_effective_config(&config, args.config.as_deref()));

    let pool = Arc::new(RendererPool::start(
        ChromiumLauncher::new(config.browser_options()),
        config.retry,
    ));
    let pipeline = RenderPipeline::new(
        Arc::new(TemplateLibrary::new(config.render.components_dir.clone())),
        Arc::clone(&pool),
        config.document_shell(),
        config.capture_settings(),
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
        default_component: Arc::from(config.render.default_component.as_str()),
        expose_error_detail: config.server.expose_error_detail,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, components = %config.render.components_dir.display(), "rendershot listening");

    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    pool.shutdown();
    info!("rendershot stopped");
    served.map_err(RenderError::from)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
