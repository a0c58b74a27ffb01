mod bootstrap;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use press_core::settings::{Command, Settings};
use press_data::analysis::OutlierOptions;
use press_runtime::service::{PressQuery, PressService, ServiceResponse};
use serde_json::Value;

fn main() -> Result<ExitCode> {
    let settings = Settings::load();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("Press Health v{} starting", env!("CARGO_PKG_VERSION"));

    let upload_dir = settings.resolved_upload_dir();
    tracing::debug!("Upload directory: {}", upload_dir.display());
    let service = PressService::open(&upload_dir)
        .with_context(|| format!("opening upload directory {}", upload_dir.display()))?;

    let response = run(&service, &settings.command)?;
    print_json(&response, settings.pretty)?;

    Ok(if response.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Dispatch one subcommand. Pipeline failures come back as error envelopes;
/// only failures to reach the pipeline at all are returned as `Err`.
fn run(service: &PressService, command: &Command) -> Result<ServiceResponse<Value>> {
    let response = match command {
        Command::Upload { path } => {
            let content =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let filename = file_name(path)?;
            tracing::info!("Uploading {} as {}", path.display(), filename);
            ServiceResponse::respond(service.upload(&filename, &content))
        }

        Command::Press { file, sn } => ServiceResponse::respond(service.press_detail(&PressQuery {
            filename: file.clone(),
            sn: sn.clone(),
        })),

        Command::Plot {
            file,
            sn,
            session,
            remove_outliers,
            level,
        } => {
            let options = OutlierOptions {
                enabled: *remove_outliers,
                level: *level,
            };
            ServiceResponse::respond(service.session_plot_data(file, sn, session, options))
        }

        Command::Errors { file, sn, session } => {
            ServiceResponse::respond(service.session_error_stats(file, sn, session))
        }

        Command::List => ServiceResponse::Ok(Value::from(service.store().list())),

        Command::Request { kind, path } => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            service.handle(*kind, &body)
        }
    };
    Ok(response)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn print_json(response: &ServiceResponse<Value>, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    println!("{text}");
    Ok(())
}
