//! Lightweight Cache
//!
//! Lazily filled indexes over the mapping metadata of one tablespace, plus a
//! memo of assembled [`StorageDescription`]s.
//!
//! Every fill and read holds the connection-wide lock of the owning
//! [`SchemaScope`]; the cache state mutex is only ever taken while that lock
//! is held, so the two never contend. Invalidation is all-or-nothing via
//! [`LightweightCache::clear`].

use crate::class_map::ClassMap;
use crate::metadata;
use crate::scope::{load_table, SchemaScope};
use crate::storage::StorageDescription;
use crate::types::{ClassId, DbTable, RelationshipEnd, TableId};
use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqliteResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Storage descriptions served from the memo
    pub hits: u64,
    /// Storage descriptions that had to be assembled
    pub misses: u64,
    /// Metadata statements issued against the tablespace
    pub metadata_queries: u64,
    /// Number of times the cache was cleared
    pub clears: u64,
}

impl CacheMetrics {
    /// Get hit rate as a percentage (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn record_hit(&mut self) {
        self.hits += 1;
    }

    fn record_miss(&mut self) {
        self.misses += 1;
    }

    fn record_query(&mut self) {
        self.metadata_queries += 1;
    }
}

/// Inner state for LightweightCache (protected by Mutex)
#[derive(Default)]
struct CacheState {
    classes_per_table: HashMap<TableId, Vec<ClassId>>,
    vertical_tables_per_class: HashMap<ClassId, BTreeSet<TableId>>,
    horizontal_tables_per_class: HashMap<ClassId, BTreeMap<TableId, Vec<ClassId>>>,
    constraint_classes_per_relationship: HashMap<ClassId, BTreeMap<ClassId, RelationshipEnd>>,
    relationships_per_class: HashMap<ClassId, BTreeMap<ClassId, RelationshipEnd>>,
    storage_descriptions: HashMap<ClassId, Arc<StorageDescription>>,
    metrics: CacheMetrics,
}

impl CacheState {
    fn clear(&mut self) {
        self.classes_per_table.clear();
        self.vertical_tables_per_class.clear();
        self.horizontal_tables_per_class.clear();
        self.constraint_classes_per_relationship.clear();
        self.relationships_per_class.clear();
        self.storage_descriptions.clear();
        self.metrics.clears += 1;
    }
}

/// Class-to-table partition cache for one tablespace
///
/// Owned alongside its [`SchemaScope`]. Callers must invoke [`clear`](Self::clear)
/// whenever the class/table mapping may have changed, e.g. after a schema import.
pub struct LightweightCache {
    scope: Arc<SchemaScope>,
    state: Mutex<CacheState>,
}

impl LightweightCache {
    pub fn new(scope: Arc<SchemaScope>) -> Self {
        Self {
            scope,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn scope(&self) -> &Arc<SchemaScope> {
        &self.scope
    }

    /// Run `f` with the connection-wide lock held
    fn with_locked<R>(&self, f: impl FnOnce(&mut LockedCache<'_>) -> R) -> R {
        let conn = self.scope.lock();
        let mut state = self.state.lock();
        let mut locked = LockedCache {
            conn: &conn,
            table_space: self.scope.table_space(),
            state: &mut state,
        };
        f(&mut locked)
    }

    /// Classes whose instances occupy `table`, ascending and distinct
    pub fn get_classes_for_table(&self, table: TableId) -> Vec<ClassId> {
        self.with_locked(|cache| cache.classes_for_table(table).to_vec())
    }

    /// Tables a class's own rows are spread over, including its split-off tables
    pub fn get_vertical_partitions_for_class(&self, class_id: ClassId) -> BTreeSet<TableId> {
        self.with_locked(|cache| cache.vertical_partitions_for_class(class_id).clone())
    }

    /// Per table, the part of the class's hierarchy stored there, the class first
    pub fn get_horizontal_partitions_for_class(
        &self,
        class_id: ClassId,
    ) -> BTreeMap<TableId, Vec<ClassId>> {
        self.with_locked(|cache| cache.horizontal_partitions_for_class(class_id).clone())
    }

    /// Every constraint class of a relationship and the end(s) it may occupy
    pub fn get_constraint_classes_for_relationship_class(
        &self,
        relationship_class_id: ClassId,
    ) -> BTreeMap<ClassId, RelationshipEnd> {
        self.with_locked(|cache| {
            cache
                .constraint_classes_for_relationship_class(relationship_class_id)
                .clone()
        })
    }

    /// Every relationship class a class may take part in, and at which end(s)
    pub fn get_relationships_for_class(
        &self,
        class_id: ClassId,
    ) -> BTreeMap<ClassId, RelationshipEnd> {
        self.with_locked(|cache| cache.relationships_for_class(class_id).clone())
    }

    /// The storage description of a class, assembled on first request
    pub fn get_storage_description(&self, class_map: &ClassMap) -> Arc<StorageDescription> {
        let class_id = class_map.class_id();
        self.with_locked(|cache| {
            if let Some(description) = cache.state.storage_descriptions.get(&class_id) {
                trace!("Storage description for class {} served from cache", class_id);
                let description = Arc::clone(description);
                cache.state.metrics.record_hit();
                return description;
            }

            cache.state.metrics.record_miss();
            let description = Arc::new(StorageDescription::create(class_map, cache));
            cache
                .state
                .storage_descriptions
                .insert(class_id, Arc::clone(&description));
            description
        })
    }

    /// Drop every memoized value
    pub fn clear(&self) {
        self.with_locked(|cache| cache.state.clear());
        debug!("Cleared lightweight cache for [{}]", self.scope.table_space());
    }

    /// Get a snapshot of cache metrics
    pub fn metrics(&self) -> CacheMetrics {
        self.with_locked(|cache| cache.state.metrics.clone())
    }
}

/// The cache with the connection-wide lock held
///
/// Getters fill their index on first use and hand out references into it.
pub(crate) struct LockedCache<'a> {
    conn: &'a Connection,
    table_space: &'a str,
    state: &'a mut CacheState,
}

impl LockedCache<'_> {
    /// Account for a metadata statement; failures keep the partial result
    fn settle(&mut self, what: &str, key: impl Display, result: SqliteResult<()>) {
        self.state.metrics.record_query();
        if let Err(e) = result {
            error!("Failed to load {} for {}: {}", what, key, e);
            debug_assert!(false, "failed to load {what} for {key}: {e}");
        }
    }

    pub(crate) fn table(&self, id: TableId) -> Option<DbTable> {
        match load_table(self.conn, self.table_space, id) {
            Ok(table) => table,
            Err(e) => {
                error!("Failed to load table {}: {}", id, e);
                debug_assert!(false, "failed to load table {id}: {e}");
                None
            }
        }
    }

    pub(crate) fn classes_for_table(&mut self, table: TableId) -> &[ClassId] {
        if !self.state.classes_per_table.contains_key(&table) {
            let mut classes = Vec::new();
            let result =
                metadata::classes_for_table(self.conn, self.table_space, table, &mut classes);
            self.settle("classes", format_args!("table {table}"), result);
            debug!("Table {} holds {} class(es)", table, classes.len());
            self.state.classes_per_table.insert(table, classes);
        }
        &self.state.classes_per_table[&table]
    }

    pub(crate) fn vertical_partitions_for_class(&mut self, class_id: ClassId) -> &BTreeSet<TableId> {
        if !self.state.vertical_tables_per_class.contains_key(&class_id) {
            let mut tables = BTreeSet::new();
            let result =
                metadata::tables_for_class(self.conn, self.table_space, class_id, &mut tables);
            self.settle("vertical tables", format_args!("class {class_id}"), result);
            debug!("Class {} spans {} table(s)", class_id, tables.len());
            self.state.vertical_tables_per_class.insert(class_id, tables);
        }
        &self.state.vertical_tables_per_class[&class_id]
    }

    pub(crate) fn horizontal_partitions_for_class(
        &mut self,
        class_id: ClassId,
    ) -> &BTreeMap<TableId, Vec<ClassId>> {
        if !self.state.horizontal_tables_per_class.contains_key(&class_id) {
            // Mixin status is checked on every fill, never cached
            let is_mixin = match metadata::is_mixin(self.conn, self.table_space, class_id) {
                Ok(is_mixin) => {
                    self.settle("mixin status", format_args!("class {class_id}"), Ok(()));
                    is_mixin
                }
                Err(e) => {
                    self.settle("mixin status", format_args!("class {class_id}"), Err(e));
                    false
                }
            };

            let mut tables = BTreeMap::new();
            let result = metadata::horizontal_tables_for_class(
                self.conn,
                self.table_space,
                class_id,
                is_mixin,
                &mut tables,
            );
            self.settle("horizontal tables", format_args!("class {class_id}"), result);
            debug!(
                "Class {}{} is stored horizontally in {} table(s)",
                class_id,
                if is_mixin { " (mixin)" } else { "" },
                tables.len()
            );
            self.state.horizontal_tables_per_class.insert(class_id, tables);
        }
        &self.state.horizontal_tables_per_class[&class_id]
    }

    pub(crate) fn constraint_classes_for_relationship_class(
        &mut self,
        relationship_class_id: ClassId,
    ) -> &BTreeMap<ClassId, RelationshipEnd> {
        if !self
            .state
            .constraint_classes_per_relationship
            .contains_key(&relationship_class_id)
        {
            let mut classes = BTreeMap::new();
            let result = metadata::constraint_classes_for_relationship(
                self.conn,
                self.table_space,
                relationship_class_id,
                &mut classes,
            );
            self.settle(
                "constraint classes",
                format_args!("relationship {relationship_class_id}"),
                result,
            );
            debug!(
                "Relationship {} admits {} constraint class(es)",
                relationship_class_id,
                classes.len()
            );
            self.state
                .constraint_classes_per_relationship
                .insert(relationship_class_id, classes);
        }
        &self.state.constraint_classes_per_relationship[&relationship_class_id]
    }

    pub(crate) fn relationships_for_class(
        &mut self,
        class_id: ClassId,
    ) -> &BTreeMap<ClassId, RelationshipEnd> {
        if !self.state.relationships_per_class.contains_key(&class_id) {
            let mut relationships = BTreeMap::new();
            let result = metadata::relationships_for_class(
                self.conn,
                self.table_space,
                class_id,
                &mut relationships,
            );
            self.settle("relationships", format_args!("class {class_id}"), result);
            self.state
                .relationships_per_class
                .insert(class_id, relationships);
        }
        &self.state.relationships_per_class[&class_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeOptions;

    fn cache_with(sql: &str) -> LightweightCache {
        let scope = SchemaScope::in_memory(ScopeOptions::default()).unwrap();
        scope.lock().execute_batch(sql).unwrap();
        LightweightCache::new(Arc::new(scope))
    }

    const ONE_TABLE: &str = r#"
        INSERT INTO ec_Schema (Id, Name) VALUES (1, 'Test');
        INSERT INTO ec_Class (Id, SchemaId, Name) VALUES (10, 1, 'Base'), (11, 1, 'Sub');
        INSERT INTO ec_cache_ClassHierarchy (ClassId, BaseClassId) VALUES (10, 10), (11, 11), (11, 10);
        INSERT INTO ec_Table (Id, Name, Type) VALUES (1, 'ts_Base', 0);
        INSERT INTO ec_cache_ClassHasTables (ClassId, TableId) VALUES (11, 1), (10, 1);
    "#;

    #[test]
    fn test_classes_for_table_sorted() {
        let cache = cache_with(ONE_TABLE);
        assert_eq!(
            cache.get_classes_for_table(TableId(1)),
            vec![ClassId(10), ClassId(11)]
        );
        assert!(cache.get_classes_for_table(TableId(2)).is_empty());
    }

    #[test]
    fn test_raw_index_filled_once() {
        let cache = cache_with(ONE_TABLE);

        cache.get_classes_for_table(TableId(1));
        let after_first = cache.metrics().metadata_queries;
        cache.get_classes_for_table(TableId(1));

        assert_eq!(after_first, 1);
        assert_eq!(cache.metrics().metadata_queries, 1);
    }

    #[test]
    fn test_horizontal_fill_checks_mixin() {
        let cache = cache_with(ONE_TABLE);

        let horizontal = cache.get_horizontal_partitions_for_class(ClassId(10));
        assert_eq!(horizontal[&TableId(1)], vec![ClassId(10), ClassId(11)]);
        // mixin check plus the partition query
        assert_eq!(cache.metrics().metadata_queries, 2);
    }

    #[test]
    fn test_horizontal_list_starts_with_class() {
        let cache = cache_with(
            r#"
            INSERT INTO ec_Schema (Id, Name) VALUES (1, 'Test');
            INSERT INTO ec_Class (Id, SchemaId, Name) VALUES (20, 1, 'Base'), (11, 1, 'Early'), (30, 1, 'Late');
            INSERT INTO ec_cache_ClassHierarchy (ClassId, BaseClassId) VALUES
                (20, 20), (11, 11), (30, 30), (11, 20), (30, 20);
            INSERT INTO ec_Table (Id, Name, Type) VALUES (1, 'ts_Base', 0);
            INSERT INTO ec_cache_ClassHasTables (ClassId, TableId) VALUES (11, 1), (20, 1), (30, 1);
            "#,
        );

        let horizontal = cache.get_horizontal_partitions_for_class(ClassId(20));
        assert_eq!(
            horizontal[&TableId(1)],
            vec![ClassId(20), ClassId(11), ClassId(30)]
        );
    }

    #[test]
    fn test_clear_counts_and_refills() {
        let cache = cache_with(ONE_TABLE);
        cache.get_classes_for_table(TableId(1));
        cache.clear();
        cache.get_classes_for_table(TableId(1));

        let metrics = cache.metrics();
        assert_eq!(metrics.clears, 1);
        assert_eq!(metrics.metadata_queries, 2);
    }

    /// A cache whose tablespace is not attached, so every fill fails to prepare
    fn detached_cache() -> LightweightCache {
        let options = ScopeOptions::default().with_table_space("ghost");
        LightweightCache::new(Arc::new(SchemaScope::in_memory(options).unwrap()))
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "failed to load classes for table 1")]
    fn test_failed_fill_asserts_in_debug() {
        detached_cache().get_classes_for_table(TableId(1));
    }

    #[test]
    fn test_failed_fill_releases_lock() {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let cache = detached_cache();
        let first = catch_unwind(AssertUnwindSafe(|| cache.get_classes_for_table(TableId(1))));
        match first {
            Ok(classes) => assert!(classes.is_empty()),
            Err(_) => assert!(cfg!(debug_assertions)),
        }

        // Both locks are free again
        assert_eq!(cache.metrics().metadata_queries, 1);
        assert!(cache.scope().lock().is_autocommit());

        let second = catch_unwind(AssertUnwindSafe(|| cache.get_classes_for_table(TableId(1))));
        if cfg!(debug_assertions) {
            assert!(second.is_err());
            assert_eq!(cache.metrics().metadata_queries, 2);
        } else {
            // The empty partial result stays memoized until clear()
            assert_eq!(second.ok(), Some(Vec::new()));
            assert_eq!(cache.metrics().metadata_queries, 1);
        }
    }

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((metrics.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheMetrics::default().hit_rate(), 0.0);
    }
}
