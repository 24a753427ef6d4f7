//! Checkpoint persistence
//!
//! Provides [`FileCheckpointStore`], the on-disk implementation of the
//! [`CheckpointStore`](conductor_application::CheckpointStore) port.

mod file_store;

pub use file_store::FileCheckpointStore;
