use thiserror::Error;

/// Command construction failures. Only structurally invalid inputs land here;
/// user query text is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("page limit must be greater than zero")]
    ZeroLimit,

    #[error("delete requires a row id")]
    MissingRowId,

    #[error("failed to encode command: {0}")]
    Encode(String),
}

/// Reasons a store response could not be turned into a [`crate::models::PageResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, or JSON that is not an object.
    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("response is missing field `{0}`")]
    MissingField(String),

    #[error("response field `{0}` has the wrong type")]
    TypeMismatch(String),

    /// The store answered with its `{"error": "..."}` envelope.
    #[error("store reported an error: {0}")]
    StoreReported(String),

    #[error("row id {0} appears more than once in one page")]
    DuplicateRowId(i64),

    #[error("store returned {received} items for a page of {limit}")]
    PageOverflow { limit: u32, received: usize },
}
