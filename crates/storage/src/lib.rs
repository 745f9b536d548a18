#![forbid(unsafe_code)]

pub mod repository;
pub mod session_state;
pub mod sqlite;

pub use repository::{InMemoryStore, KeyValueStore, Storage, StorageError};
pub use session_state::SessionStateRepository;
