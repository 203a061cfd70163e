//! `TranslationStore` implementations.
//!
//! [`MemoryStore`] keeps everything in process memory. [`RedbStore`] persists
//! to a single file and is available with the `redb` feature.

mod memory;
#[cfg(feature = "redb")]
mod redb_store;

pub use memory::MemoryStore;
#[cfg(feature = "redb")]
pub use redb_store::RedbStore;
