use thiserror::Error;

/// Errors surfaced by the renko pipeline.
///
/// Every kind is local to this crate: nothing here wraps I/O errors (the CLI
/// layer attaches file context with `anyhow`). Partial outputs are never
/// produced — a failing stage returns one of these instead.
#[derive(Debug, Error)]
pub enum RenkoError {
    /// Brick size is zero, negative, or non-finite.
    #[error("invalid brick size: {0}")]
    InvalidBrickSize(f64),

    /// Brick size would produce an unreasonable number of bricks.
    #[error("brick size too small ({brick_size:.6}): would create ~{estimated_bricks} bricks")]
    BrickSizeTooSmall {
        brick_size: f64,
        estimated_bricks: u64,
    },

    /// ADR sizing requested but no session has enough complete prior sessions.
    #[error("insufficient history for ADR({adr_period}): need at least {} trading sessions", .adr_period + 1)]
    InsufficientHistory { adr_period: usize },

    /// A stage that requires rows received none.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// A predicate expression failed to parse or referenced an unknown column.
    #[error("invalid expression at position {position}: {message}")]
    InvalidExpression { position: usize, message: String },

    /// Configuration values are inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The job was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, RenkoError>;
