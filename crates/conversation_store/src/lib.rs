//! Durable storage for conversation trees.
//!
//! [`ConversationRegistry`] owns the catalogue of conversations and hands
//! out one shared [`TreeStore`] per conversation. Every store mutation is
//! written through a [`TreeStorage`] adapter before it returns.

pub mod error;
pub mod registry;
pub mod storage;
pub mod tree_store;

pub use error::{StoreError, StoreResult};
pub use registry::{ConversationRegistry, ConversationSummary};
pub use storage::{FileTreeStorage, SqliteTreeStorage, TreeStorage};
pub use tree_store::{load_healed, Cursor, TreeStore};
