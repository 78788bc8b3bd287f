#![warn(rust_2018_idioms)]

use std::process::ExitCode;

use vault_demo::{run, AppSettings, Exit, LoggerBuilder, APPLICATION_NAME};

#[tokio::main]
async fn main() -> ExitCode {
    let _guard = match LoggerBuilder::new(APPLICATION_NAME).json_from_env().init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Unable to setup logger: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match AppSettings::load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "Could not load settings. Terminating.");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Unable to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    match run(&settings, shutdown).await {
        Ok(Exit::Shutdown) => ExitCode::SUCCESS,
        Ok(Exit::Expired(failure)) => {
            tracing::error!(
                subject = %failure.subject,
                cause = %failure.cause,
                "Cannot renew credential. App will terminate."
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Terminating.");
            ExitCode::FAILURE
        }
    }
}
