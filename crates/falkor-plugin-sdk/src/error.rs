use thiserror::Error;

/// Configuration and lifecycle failures raised by the plugin controller.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("setup descriptor is missing; call `configure` before starting the plugin")]
    MissingSetup,

    #[error("plugin already started and cannot be started or reconfigured again")]
    AlreadyStarted,

    #[error("invalid port `{0}`: must be an integer between 1 and 65535")]
    InvalidPort(String),

    #[error("no {0} handler is bound")]
    MissingHandler(&'static str),

    #[error("invalid {0} handler: {1}")]
    InvalidHandler(&'static str, String),

    #[error("invalid setup descriptor: {0}")]
    InvalidSetup(String),

    #[error("failed to start HTTP transport")]
    Transport(#[source] anyhow::Error),

    #[error("failed to register plugin routes")]
    Routes(#[source] anyhow::Error),
}

pub type Result<T, E = PluginError> = std::result::Result<T, E>;
