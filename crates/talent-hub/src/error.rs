use crate::config::ConfigError;
use crate::integrations::{ErrorKind, HubError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Process-level failure: anything that stops the service or a CLI command.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Seed(serde_json::Error),
    Hub(HubError),
}

impl AppError {
    /// sysexits-style code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Telemetry(_) => 78,
            AppError::Seed(_) => 65,
            AppError::Io(_) => 74,
            AppError::Server(_) => 70,
            AppError::Hub(err) if err.kind == ErrorKind::IntegrationNotFound => 66,
            AppError::Hub(_) => 1,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {err}"),
            AppError::Telemetry(err) => write!(f, "telemetry error: {err}"),
            AppError::Io(err) => write!(f, "io error: {err}"),
            AppError::Server(err) => write!(f, "server error: {err}"),
            AppError::Seed(err) => write!(f, "invalid integrations file: {err}"),
            AppError::Hub(err) => write!(f, "{}: {}", err.kind, err.message),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Seed(err) => Some(err),
            AppError::Hub(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Hub(err) = self {
            return err.into_response();
        }

        tracing::error!(error = %self, "request failed outside the hub");
        let body = Json(json!({
            "kind": ErrorKind::Storage,
            "error": "internal error",
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

macro_rules! app_error_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for AppError {
                fn from(value: $source) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

app_error_from! {
    ConfigError => Config,
    TelemetryError => Telemetry,
    std::io::Error => Io,
    axum::Error => Server,
    serde_json::Error => Seed,
    HubError => Hub,
}
