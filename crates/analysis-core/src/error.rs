use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No data provider available: {0}")]
    ProviderUnavailable(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl From<std::io::Error> for AnalysisError {
    fn from(e: std::io::Error) -> Self {
        AnalysisError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        AnalysisError::ParseError(e.to_string())
    }
}
