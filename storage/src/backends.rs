//! Storage backend modules.
//! These modules implement the `ExplorerStorage` trait for whatever struct
//! containing state for specific storage solutions (databases, volatile
//! memory, etc.).

pub mod in_memory;
