use thiserror::Error;

/// Why an ingestion call was refused. Nothing is stored when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("invalid payload: missing eventId")]
    MissingEventId,
}

/// Retrieval failure, kept distinct from validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("event '{0}' not found")]
    NotFound(String),
}
