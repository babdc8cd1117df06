use std::path::PathBuf;

/// Errors surfaced by the signal and backtest engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient data for {strategy}: have {have} bars, need {need}")]
    InsufficientData {
        strategy: String,
        have: usize,
        need: usize,
    },

    #[error("malformed candle series: {reason}")]
    MalformedSeries { reason: String },

    #[error("candle series is not strictly ordered by timestamp at index {index}")]
    UnsortedSeries { index: usize },

    #[error("invalid range for parameter {name}: {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("parameter space is empty")]
    EmptyParameterSpace,

    #[error("parameter grid over {axes} axes has more cells than can be enumerated")]
    GridTooLarge { axes: usize },

    #[error("unknown parameter {name} for {strategy}")]
    UnknownParameter { name: String, strategy: String },

    #[error("unknown strategy template: {0}")]
    UnknownStrategy(String),

    #[error("{expected} generator cannot take a {found} config")]
    ConfigMismatch { expected: String, found: String },

    #[error("indicator {0} was not computed for this series")]
    MissingIndicator(String),

    #[error("optimizer finished without evaluating any candidate")]
    NoCandidateEvaluated,

    #[error(
        "failed to read both {} and {}: {source}",
        .primary.display(),
        .fallback.display()
    )]
    ConfigRead {
        primary: PathBuf,
        fallback: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config {}: {reason}", .path.display())]
    ConfigWrite { path: PathBuf, reason: String },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
