use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("no webview container matches view type '{0}'")]
    TargetNotFound(String),

    #[error("bare call target is ambiguous with {0} live containers; qualify as \"<view-type>::<function>\"")]
    AmbiguousTarget(usize),

    #[error("webview container '{0}' is disposed")]
    ContainerDisposed(String),

    #[error("coordinator is stopped")]
    Stopped,

    #[error("call queue for '{0}' closed before delivery")]
    QueueClosed(String),

    #[error("unknown remote function '{0}'")]
    UnknownFunction(String),

    #[error("host capability object was already acquired")]
    AlreadyAcquired,

    #[error("template error: {0}")]
    Template(String),

    #[error("manifest not readable at {0}")]
    ManifestNotFound(PathBuf),

    #[error("unit '{unit}' failed during {phase}: {message}")]
    Unit {
        unit: String,
        phase: &'static str,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
