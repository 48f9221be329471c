//! Entry point for the procward binary

use anyhow::Context;
use clap::Parser;
use procward::{
    Args, FanoutSink, HostService, JsonLinesSink, LogFormat, LogSink, ProcessSupervisor,
    ServiceExit, TracingSink, create_process_manager, report_fatal,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

fn init_tracing(log_level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "procward={log_level},procward_core={log_level},\
             procward_unix={log_level},procward_windows={log_level}"
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Plain => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers, falling back to ctrl_c: {}", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl_c: {}", e);
        // Without a way to hear the stop request, only the child's exit ends the run
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}

async fn run(args: Args) -> anyhow::Result<ServiceExit> {
    let config = args.load_config()?;

    let mut sink = FanoutSink::new(vec![Arc::new(TracingSink) as Arc<dyn LogSink>]);
    let file_sink = match &args.log_file {
        Some(path) => {
            let file_sink = Arc::new(
                JsonLinesSink::open(path)
                    .await
                    .with_context(|| format!("cannot open log file {}", path.display()))?,
            );
            sink.push(file_sink.clone());
            Some(file_sink)
        }
        None => None,
    };
    let sink: Arc<dyn LogSink> = Arc::new(sink);

    let config_path = args.config_path(&config);
    info!(
        config = %config_path.display(),
        base_directory = %config.base_directory.display(),
        "Starting procward"
    );

    let supervisor = ProcessSupervisor::new(config, create_process_manager(), sink);
    let service = HostService::new(supervisor, config_path);
    let exit = service.run_until(wait_for_shutdown_signal()).await;

    if let Some(file_sink) = file_sink {
        file_sink.shutdown().await;
    }
    Ok(exit)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    match run(args).await {
        Ok(exit) => {
            info!(outcome = ?exit, "procward finished");
            ExitCode::from(exit.exit_code())
        }
        Err(e) => {
            error!("{:#}", e);
            report_fatal(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
