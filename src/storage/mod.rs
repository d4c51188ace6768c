pub mod engine;
pub mod memory;
pub mod sql;
pub mod table;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use engine::StorageEngine;
pub use memory::{CommitRecord, InMemoryStorage};
pub use table::{Table, TableSchema};
#[cfg(feature = "postgres")]
pub use postgres::{PgTransaction, PostgresStorage};
