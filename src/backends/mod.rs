//! Storage media a version log can live on

pub mod file_lob_backend;
pub mod memory_lob_backend;

pub use file_lob_backend::FileLobBackend;
pub use memory_lob_backend::MemoryLobBackend;

/// Backend used when a store is opened by path
pub type DefaultLobBackend = FileLobBackend;
