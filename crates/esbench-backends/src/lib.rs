//! Operation providers for esbench.
//!
//! Each provider implements [`esbench_core::OperationProvider`] on top of one
//! storage backend so the same workload can be measured against all of them.

pub mod memory;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryProvider;
pub use sqlite::SqliteProvider;

#[cfg(feature = "postgres")]
pub use postgres::PostgresProvider;

