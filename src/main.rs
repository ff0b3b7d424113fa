mod cli;
mod config;
mod error;
mod metrics;
mod prober;
mod render;
mod runner;
mod summary;
mod util;

use clap::Parser;
use cli::{Args, NoPrompter, StdinPrompter};
use config::{ColorMode, FileConfig};
use metrics::{bind_metrics, serve_metrics, ProbeMetrics};
use render::{ConsoleObserver, RenderConfig, Renderer};
use runner::{RunStatus, Runner};

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn use_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

/// Interrupted before the run started: there is no report to print.
fn interrupted<W: io::Write>(renderer: &mut Renderer<W>, json: bool) -> anyhow::Result<ExitCode> {
    if !json {
        renderer.interrupted()?;
    }
    Ok(ExitCode::from(130))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Load config first to get log level
    let file = match &args.config {
        Some(path) => config::load_file_config(path).await?,
        None => FileConfig::default(),
    };

    let color = use_color(cli::color_mode(&args, &file));
    let render_config = RenderConfig {
        color,
        spinner: !args.json && io::stderr().is_terminal(),
    };
    let mut renderer = Renderer::stdout(render_config);
    if !args.json {
        renderer.banner()?;
    }

    // Installed before any prompt so an interrupt is honoured from here on
    let cancel = CancellationToken::new();
    {
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping run");
                token.cancel();
            }
        });
    }

    let json = args.json;
    let read = if cli::can_prompt(&args) {
        cli::read_settings(args, file, StdinPrompter::new(color), &cancel).await?
    } else {
        cli::read_settings(args, file, NoPrompter, &cancel).await?
    };
    let Some(settings) = read else {
        return interrupted(&mut renderer, json);
    };

    // Init tracing with configured log level
    let log_level = config::get_tracing_level(&settings.log_level)?;
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
                         .add_directive(format!("tcp_probe={}", log_level.as_str().to_lowercase()).parse()?))
        .init();

    if !settings.json {
        renderer.resolving()?;
    }
    let resolved = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        resolved = util::resolve_target(&settings.host, settings.port, settings.family) => Some(resolved),
    };
    let target = match resolved {
        Some(Ok(target)) => target,
        Some(Err(e)) => {
            error!("{}", e);
            if !settings.json {
                renderer.resolve_failed(&e)?;
            }
            return Ok(ExitCode::from(1));
        }
        None => return interrupted(&mut renderer, settings.json),
    };
    info!("resolved {} to {}", target.host, target.addr);

    let runner = Runner::new(settings.probe)?;

    let metrics = match settings.metrics_listen {
        Some(addr) => {
            let listener = bind_metrics(addr).await?;
            let m = ProbeMetrics::new(&format!("{}:{}", target.host, target.port()))?;
            tokio::spawn(serve_metrics(listener, m.clone()));
            Some(m)
        }
        None => None,
    };

    let console = if settings.json {
        None
    } else {
        renderer.resolved(&target)?;
        renderer.starting()?;
        renderer.header(&target, runner.config())?;
        Some(ConsoleObserver::new(renderer))
    };

    let mut observer = (console, metrics);
    let report = runner.run(&target, &mut observer, &cancel).await;
    let (console, _) = observer;

    match console {
        Some(console) => {
            let mut renderer = console.into_renderer();
            if report.status == RunStatus::Cancelled {
                renderer.interrupted()?;
            }
            renderer.summary(&report.summary)?;
            if report.status == RunStatus::Completed {
                renderer.complete()?;
            }
        }
        None => {
            serde_json::to_writer_pretty(io::stdout().lock(), &report)?;
            println!();
        }
    }

    let code = match report.status {
        RunStatus::Cancelled => 130,
        RunStatus::Completed if report.summary.success_count > 0 => 0,
        RunStatus::Completed => 2,
    };
    Ok(ExitCode::from(code))
}
