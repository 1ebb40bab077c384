//! Error type definitions for the storage module.

use failure::Fail;
use std::fmt;

/// Storage Error
#[derive(Debug, Fail)]
#[fail(display = "{} : at \"{}\", msg {}", kind, info, msg)]
pub struct StorageError {
    /// Operation kind
    kind: StorageErrorKind,
    /// Operation parameter
    info: String,
    /// Error message from database
    msg: String,
}

impl StorageError {
    /// Create a storage error based on operation kind and related info.
    pub fn new(kind: StorageErrorKind, info: String, msg: String) -> Self {
        Self { kind, info, msg }
    }
}

/// Storage Errors while operating on database
#[derive(Debug)]
pub enum StorageErrorKind {
    /// Errors when creating a connection to the backend database
    Connection,
    /// Errors when inserting rows into a table
    Insert,
    /// Errors when reading rows from a table
    Select,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageError::{:?}", self)
    }
}
