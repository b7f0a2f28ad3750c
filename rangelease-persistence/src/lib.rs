//! # Range Lease Persistence
//!
//! Stores for the durable state of each range: the last applied lease, the
//! prior read summary it came with, and its log index. One record per range;
//! saving replaces the record atomically.
//!
//! ## Implementations
//!
//! - [`InMemoryPersistence`] - Records kept in memory (testing/non-persistent)
//! - [`FileSystemPersistence`] - One file per range (persistent across restarts)
//!
//! ## Example
//!
//! ```rust
//! use rangelease_persistence::InMemoryPersistence;
//! use rangelease_core::persistence::PersistenceLayer;
//! use rangelease_core::RangeId;
//!
//! # tokio_test::block_on(async {
//! let persistence = InMemoryPersistence::new();
//! persistence.save_range_state(RangeId::new(1), b"state").await.unwrap();
//! let state = persistence.load_range_state(RangeId::new(1)).await.unwrap();
//! assert_eq!(state, Some(b"state".to_vec()));
//! assert_eq!(persistence.list_ranges().await.unwrap(), vec![RangeId::new(1)]);
//! # });
//! ```

pub mod file_system;
pub mod in_memory;
mod tests;

pub use file_system::FileSystemPersistence;
pub use in_memory::InMemoryPersistence;
