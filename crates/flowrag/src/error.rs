//! Error types for the pipeline engine and its stages

use thiserror::Error;

/// Result type alias for flowrag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline and stage errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, detected before any I/O
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structural error in a pipeline graph
    #[error("Graph error at '{stage}'{}: {message}", describe_port(.port))]
    Graph {
        stage: String,
        port: Option<String>,
        message: String,
    },

    /// A source whose content type has no registered converter
    #[error("Unsupported source '{path}': no converter for content type '{content_type}'")]
    UnsupportedSource { path: String, content_type: String },

    /// A converter failed on a specific source
    #[error("Failed to convert '{path}': {message}")]
    Conversion { path: String, message: String },

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Vector store error
    #[error("Vector store error: {0}")]
    Store(String),

    /// Generator (LLM) error
    #[error("Generation error: {0}")]
    Generation(String),

    /// A stage failed while the pipeline was running
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// The run was cancelled
    #[error("Pipeline run cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_port(port: &Option<String>) -> String {
    port.as_ref()
        .map(|p| format!(" (port '{}')", p))
        .unwrap_or_default()
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a structural graph error
    pub fn graph(stage: impl Into<String>, port: Option<&str>, message: impl Into<String>) -> Self {
        Self::Graph {
            stage: stage.into(),
            port: port.map(str::to_string),
            message: message.into(),
        }
    }

    /// Create a conversion error
    pub fn conversion(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Attach the failing stage name, unless the error already carries one
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        match self {
            err @ (Self::Stage { .. } | Self::Cancelled | Self::Graph { .. }) => err,
            err => Self::Stage {
                stage: stage.into(),
                source: Box::new(err),
            },
        }
    }

    /// Per-file errors that are recorded and skipped instead of aborting a run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::UnsupportedSource { .. } | Self::Conversion { .. }
        )
    }

    /// Strip stage wrappers and return the underlying cause
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            err => err,
        }
    }

    /// Short label for the error class, used in skip reports
    pub fn kind(&self) -> &'static str {
        match self.root_cause() {
            Self::Config(_) => "ConfigurationError",
            Self::Graph { .. } => "GraphError",
            Self::UnsupportedSource { .. } => "UnsupportedSourceError",
            Self::Conversion { .. } => "ConversionError",
            Self::Embedding(_) => "EmbeddingError",
            Self::Store(_) => "StoreError",
            Self::Generation(_) => "GenerationError",
            Self::Cancelled => "Cancelled",
            Self::Io(_) => "IoError",
            Self::Json(_) | Self::Toml(_) => "SerializationError",
            Self::Http(_) => "HttpError",
            Self::Stage { .. } | Self::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_names_stage_and_port() {
        let err = Error::graph("retriever", Some("query_embedding"), "input port is not connected");
        let msg = err.to_string();
        assert!(msg.contains("retriever"));
        assert!(msg.contains("query_embedding"));
    }

    #[test]
    fn test_in_stage_wraps_once() {
        let err = Error::store("index missing").in_stage("writer").in_stage("other");
        match &err {
            Error::Stage { stage, .. } => assert_eq!(stage, "writer"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), "StoreError");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_conversion_is_recoverable() {
        let err = Error::conversion("c.pdf", "bad header");
        assert!(err.is_recoverable());
        assert_eq!(err.kind(), "ConversionError");
    }
}
