//! Named entry collection error types

use thiserror::Error;

/// Named entry collection error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// Another live entry already owns the name hash
    #[error("name hash {name_hash} already belongs to entry {owner}")]
    NameCollision {
        /// The contested name hash
        name_hash: i32,
        /// Id of the entry holding it
        owner: u32,
    },

    /// -1 marks an unnamed entry and cannot be assigned as a name
    #[error("name hash -1 is reserved for unnamed entries")]
    ReservedNameHash,

    /// No entry with the given id
    #[error("no entry with id {0}")]
    NotFound(u32),

    /// Every id up to u32::MAX is taken
    #[error("no free entry ids left")]
    IdsExhausted,
}

/// Result type for named entry collection operations
pub type CollectionResult<T> = Result<T, CollectionError>;
