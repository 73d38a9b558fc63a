use thiserror::Error;

/// Everything that can stop a translation run, or one service within it.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid compose file: {message}")]
    Manifest { message: String },

    #[error("failed to resolve the image for service {service}: {source}")]
    Resolution {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("service {service} has an unknown restart policy {value:?}")]
    Policy { service: String, value: String },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

impl TranslateError {
    pub fn manifest(message: impl Into<String>) -> TranslateError {
        TranslateError::Manifest {
            message: message.into(),
        }
    }
}
