//! Long-term memory adapters.
//!
//! Provides [`JsonlMemoryStore`], an append-only JSONL file implementing the
//! [`MemoryPort`](conductor_application::MemoryPort).

mod jsonl_store;

pub use jsonl_store::{DEFAULT_RECALL_LIMIT, JsonlMemoryStore};
