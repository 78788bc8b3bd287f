use std::collections::HashMap;
use std::io;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("log tracer already initialized")]
    LogTracerAlreadyInitialized,

    #[error("global tracing subscriber already set")]
    SubscriberAlreadySet,
}

/// Builder for the process-wide logger
pub struct LoggerBuilder {
    application: String,
    json_enabled: bool,
}

impl LoggerBuilder {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            json_enabled: false,
        }
    }

    pub fn json_enabled(mut self, enabled: bool) -> Self {
        self.json_enabled = enabled;
        self
    }

    /// `JSON_LOG=true` switches to bunyan JSON lines
    pub fn json_from_env(self) -> Self {
        self.json_from_environ(&std::env::vars().collect())
    }

    pub fn json_from_environ(mut self, environ: &HashMap<String, String>) -> Self {
        self.json_enabled = environ
            .get("JSON_LOG")
            .is_some_and(|s| s.parse().unwrap_or_default());
        self
    }

    /// Installs the global subscriber. Keep the guard alive until exit so buffered lines get flushed.
    pub fn init(self) -> Result<Option<WorkerGuard>, SetupError> {
        if !self.json_enabled {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .try_init()
                .map_err(|_| SetupError::SubscriberAlreadySet)?;
            return Ok(None);
        }

        // Redirect the logs from log library to tracing's subscribers.
        LogTracer::init().map_err(|_| SetupError::LogTracerAlreadyInitialized)?;

        // Non-blocking stdout writer
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stdout());

        let formatting_layer = BunyanFormattingLayer::new(self.application, non_blocking_writer);
        let subscriber = Registry::default()
            .with(EnvFilter::from_default_env())
            .with(JsonStorageLayer)
            .with(formatting_layer);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|_| SetupError::SubscriberAlreadySet)?;
        Ok(Some(guard))
    }
}
