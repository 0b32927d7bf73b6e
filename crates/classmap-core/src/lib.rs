//! ClassMap Core - Class-to-table partition cache
//!
//! This crate answers, for one tablespace of an object-relational metadata
//! database, where the instances of a class are stored:
//! - Lazily filled indexes from the mapping metadata tables
//! - Storage descriptions splitting a class over horizontal and vertical partitions
//! - Minimal class-id filter predicates for each partition
//! - Metadata DDL and a connection scope holding the connection-wide lock

pub mod cache;
pub mod class_map;
mod metadata;
pub mod partition;
pub mod schema;
pub mod scope;
pub mod storage;
pub mod types;

// Re-exports for convenience
pub use cache::{CacheMetrics, LightweightCache};
pub use class_map::{ClassMap, ClassMapping, ForeignKeyPartitionView, MapStrategy};
pub use partition::{ClassIdFilter, Partition};
pub use schema::METADATA_SCHEMA_VERSION;
pub use scope::{
    is_valid_table_space, SchemaScope, ScopeError, ScopeOptions,
    DEFAULT_STATEMENT_CACHE_CAPACITY, DEFAULT_TABLE_SPACE,
};
pub use storage::StorageDescription;
pub use types::{ClassId, DbTable, RelationshipEnd, TableId, TableKind};
