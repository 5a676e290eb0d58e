mod cli;
mod client;
mod commands;

use std::time::Duration;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use corral_enroll::bootstrap::{ensure_ca, install_scheduler};
use corral_enroll::service::SystemdManager;
use corral_enroll::EnrollCore;

use cli::{Cli, Command, Config};

/// Maximum time to wait for in-flight requests after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => cli.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Hold the non-blocking guards for the lifetime of main so logs flush on exit.
    let _log_guards = init_logging(env_filter, cli.log_file.as_deref())?;

    // ── Synchronous subcommands (no runtime needed) ──────────────────
    match &cli.command {
        Command::Version => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "platform": std::env::consts::OS,
                    })
                );
            } else {
                println!("corral {}", env!("CARGO_PKG_VERSION"));
            }
            Ok(())
        }
        Command::Join(args) => commands::join::run(args),
        Command::Pending(remote) => commands::admin::pending(remote, cli.json),
        Command::Approve {
            fingerprint,
            remote,
        } => commands::admin::approve(remote, fingerprint, cli.json),
        Command::Serve(args) => {
            let config = Config::from_cli(args);
            // ── The coordinator needs a Tokio runtime ───────────────
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(config))
        }
    }
}

/// Bootstrap CA material, start the scheduler, then serve enrollment
/// requests until a shutdown signal arrives.
async fn serve(config: Config) -> anyhow::Result<()> {
    startup_diagnostics(&config);

    let bootstrap = config.bootstrap.clone();
    let outcome = tokio::task::spawn_blocking(move || ensure_ca(&bootstrap))
        .await?
        .context("CA bootstrap failed")?;

    if config.scheduler {
        let paths = outcome.paths.clone();
        let install = config.scheduler_install();
        tokio::task::spawn_blocking(move || {
            install_scheduler(&paths, &install, &SystemdManager::default())
        })
        .await?
        .context("scheduler install failed")?;
    } else {
        tracing::info!("Scheduler install: disabled");
    }

    if !config.serve_requests {
        tracing::info!("Enrollment listener disabled, bootstrap complete");
        return Ok(());
    }

    let core = EnrollCore::new(config.enroll_config(&outcome.paths));
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("cannot bind {}", config.listen))?;
    tracing::info!("Enrollment listener on {}", config.listen);

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app(core))
            .with_graceful_shutdown(async move {
                token.cancelled().await;
            })
            .await
    });

    tracing::info!("Ready.");

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            result??;
            tracing::warn!("Enrollment listener stopped unexpectedly");
            return Ok(());
        }
    }
    tracing::info!("Shutting down...");

    cancel.cancel();
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server).await {
        Ok(result) => result??,
        Err(_) => {
            tracing::warn!(
                "Shutdown timed out after {:?}, forcing exit",
                SHUTDOWN_TIMEOUT
            );
            server.abort();
        }
    }
    Ok(())
}

fn app(core: EnrollCore) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .merge(core.routes())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ── Startup diagnostics ─────────────────────────────────────────────

fn startup_diagnostics(config: &Config) {
    tracing::info!("Corral v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform: {}", std::env::consts::OS);
    tracing::info!("Hostname: {}", config.bootstrap.hostname);
    tracing::info!("PKI directory: {}", config.bootstrap.pki_dir.display());
    tracing::info!("Tools directory: {}", config.tools_dir.display());

    match config.bootstrap.mgmt_ip {
        Some(ip) => tracing::info!("Management IP: {ip}"),
        None => tracing::info!("Management IP: not set"),
    }

    if config.auto_approve {
        tracing::info!("Approval: automatic");
    } else {
        tracing::info!("Approval: manual (corral approve <fingerprint>)");
    }
}

pub(crate) fn init_logging(
    env_filter: tracing_subscriber::EnvFilter,
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Vec<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    // Stdout is reserved for command output.
    let (nb_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(nb_stderr);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (nb_file, file_guard) = tracing_appender::non_blocking(file);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(nb_file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        Ok(vec![stderr_guard, file_guard])
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();

        Ok(vec![stderr_guard])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use corral_common::test::temp_dir;
    use corral_enroll::EnrollConfig;

    #[tokio::test]
    async fn healthz_answers_alongside_enrollment_routes() {
        let dir = temp_dir("corral-main");
        let core = EnrollCore::new(EnrollConfig {
            token: "ciao".into(),
            auto_approve: true,
            anchor_path: dir.join("missing.pem"),
            tools_dir: dir.join("tools"),
        });
        let app = app(core);

        let resp = app
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");

        let resp = app
            .oneshot(Request::get("/requests/ciao").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
