use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Fewer observations than the computation needs, or an empty alignment.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Zero variance where a ratio needs it, or out-of-domain model inputs.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// Pre-aligned inputs that do not share one time index.
    #[error("Alignment mismatch: {0}")]
    AlignmentMismatch(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("API error: {0}")]
    ApiError(String),
}
