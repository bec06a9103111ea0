/// Failure to construct an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CreationError {
    #[error("max contexts must be greater than 0")]
    InvalidCapacity,
}

/// Failure to insert a metric into an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InsertError {
    #[error("aggregator context limit reached ({0} contexts)")]
    Overflow(usize),
}
