pub mod collection;
pub mod csv;
pub mod seed;
pub mod storage;
pub mod store;

pub use collection::{Collection, Record};
pub use csv::{CsvRecord, RowReader, RowWriter, Schema};
pub use storage::{DirStorage, MemoryStorage, Storage};
pub use store::RecordStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Entity not found: {entity_type} with {key}")]
    NotFound { entity_type: String, key: String },

    #[error("Capacity exceeded: {entity_type} holds at most {capacity} records")]
    CapacityExceeded { entity_type: String, capacity: usize },

    #[error("Duplicate {entity_type}: '{key}' is already in use")]
    DuplicateKey { entity_type: String, key: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    pub(crate) fn not_found(entity_type: &str, key: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity_type: entity_type.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }
}
