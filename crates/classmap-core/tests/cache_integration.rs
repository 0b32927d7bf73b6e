//! Integration tests for the lightweight cache.
//!
//! Runs the raw indexes and storage description assembly against the
//! fixture hierarchy in `common`:
//! - Class and table indexes, including mixins and split tables
//! - Relationship constraint expansion and end merging
//! - Memoization and invalidation
//! - Tablespace scoping through an attached database
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package classmap-core --test cache_integration
//! ```

mod common;

use classmap_core::{
    ClassId, ClassIdFilter, ClassMap, ClassMapping, LightweightCache, MapStrategy, Partition,
    RelationshipEnd, SchemaScope, ScopeOptions, StorageDescription, TableId,
};
use common::*;
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tempfile::TempDir;

fn storage_of(cache: &LightweightCache, class_id: ClassId) -> Arc<StorageDescription> {
    let scope = Arc::clone(cache.scope());
    let class_map = ClassMap::load(&scope, cache, class_id)
        .expect("Failed to load class map")
        .expect("Class is not mapped");
    cache.get_storage_description(&class_map)
}

fn tables(partitions: &[Partition]) -> Vec<TableId> {
    partitions.iter().map(|p| p.table()).collect()
}

// ============================================================================
// Raw Index Tests
// ============================================================================

#[test]
fn test_classes_for_table_ascending() {
    let cache = fixture();

    assert_eq!(cache.get_classes_for_table(ELEMENT_TABLE), ids(&[10, 11, 12, 13]));
    assert_eq!(cache.get_classes_for_table(GEOMETRIC_TABLE), ids(&[11, 12]));
    assert_eq!(cache.get_classes_for_table(MARKABLE_TABLE), vec![MARKABLE]);
    assert!(cache.get_classes_for_table(TableId(404)).is_empty());
}

#[test]
fn test_vertical_partitions_include_split_tables() {
    let cache = fixture();

    assert_eq!(
        cache.get_vertical_partitions_for_class(PHYSICAL),
        BTreeSet::from([ELEMENT_TABLE, GEOMETRIC_TABLE, GEOMETRIC_OVERFLOW_TABLE])
    );
    assert_eq!(
        cache.get_vertical_partitions_for_class(ELEMENT),
        BTreeSet::from([ELEMENT_TABLE])
    );
}

#[test]
fn test_horizontal_partitions_skip_split_tables() {
    let cache = fixture();

    assert_eq!(
        cache.get_horizontal_partitions_for_class(ELEMENT),
        BTreeMap::from([(ELEMENT_TABLE, ids(&[10, 11, 12, 13]))])
    );
    assert_eq!(
        cache.get_horizontal_partitions_for_class(GEOMETRIC),
        BTreeMap::from([(ELEMENT_TABLE, ids(&[11, 12]))])
    );
}

#[test]
fn test_mixin_horizontal_partitions_span_all_table_kinds() {
    let cache = fixture();

    assert_eq!(
        cache.get_horizontal_partitions_for_class(MARKABLE),
        BTreeMap::from([
            (ELEMENT_TABLE, vec![PHYSICAL]),
            (GEOMETRIC_TABLE, vec![PHYSICAL]),
            (GEOMETRIC_OVERFLOW_TABLE, vec![PHYSICAL]),
            (MARKABLE_TABLE, vec![MARKABLE]),
            (MODEL_TABLE, vec![MODEL]),
        ])
    );
}

#[test]
fn test_constraint_classes_expand_polymorphic_ends() {
    let cache = fixture();

    assert_eq!(
        cache.get_constraint_classes_for_relationship_class(MODEL_OWNS_GEOMETRIC),
        BTreeMap::from([
            (GEOMETRIC, RelationshipEnd::Target),
            (PHYSICAL, RelationshipEnd::Target),
            (MODEL, RelationshipEnd::Source),
        ])
    );
}

#[test]
fn test_constraint_class_on_both_ends_merges() {
    let cache = fixture();

    let classes = cache.get_constraint_classes_for_relationship_class(ELEMENT_REFERS_TO_ELEMENTS);
    assert_eq!(classes.len(), 4);
    assert!(classes.values().all(|&end| end == RelationshipEnd::Both));
}

#[test]
fn test_relationships_for_class() {
    let cache = fixture();

    assert_eq!(
        cache.get_relationships_for_class(PHYSICAL),
        BTreeMap::from([
            (MODEL_OWNS_GEOMETRIC, RelationshipEnd::Target),
            (ELEMENT_REFERS_TO_ELEMENTS, RelationshipEnd::Both),
        ])
    );
    assert_eq!(
        cache.get_relationships_for_class(MODEL),
        BTreeMap::from([(MODEL_OWNS_GEOMETRIC, RelationshipEnd::Source)])
    );
    assert!(cache.get_relationships_for_class(MARKABLE).is_empty());
}

// ============================================================================
// Class Map Tests
// ============================================================================

#[test]
fn test_class_map_load() {
    let cache = fixture();
    let scope = Arc::clone(cache.scope());

    let element = ClassMap::load(&scope, &cache, ELEMENT).unwrap().unwrap();
    assert_eq!(
        element.mapping(),
        &ClassMapping::Table {
            strategy: MapStrategy::TablePerHierarchy
        }
    );

    let relationship = ClassMap::load(&scope, &cache, MODEL_OWNS_GEOMETRIC)
        .unwrap()
        .unwrap();
    let view = relationship.foreign_key_view().unwrap();
    assert_eq!(view.persisted_end(), RelationshipEnd::Target);
    assert_eq!(view.physical_tables(), &[ELEMENT_TABLE]);

    assert!(ClassMap::load(&scope, &cache, ClassId(999)).unwrap().is_none());
}

// ============================================================================
// Storage Description Tests
// ============================================================================

#[test]
fn test_storage_for_hierarchy_root_is_unfiltered() {
    let cache = fixture();
    let storage = storage_of(&cache, ELEMENT);

    assert_eq!(tables(storage.horizontal_partitions()), vec![ELEMENT_TABLE]);
    let root = storage.root_horizontal_partition().unwrap();
    assert!(root.is_root());
    assert_eq!(root.root_class_id(), Some(ELEMENT));
    assert!(!root.needs_class_id_filter());
    assert_eq!(root.class_id_filter_sql("ECClassId"), "");

    let vertical_root = storage.root_vertical_partition().unwrap();
    assert_eq!(vertical_root.table(), ELEMENT_TABLE);
    assert_eq!(
        storage.class_ids().iter().copied().collect::<Vec<_>>(),
        ids(&[10, 11, 12, 13])
    );
}

#[test]
fn test_storage_for_subclass_filters_shared_table() {
    let cache = fixture();
    let storage = storage_of(&cache, GEOMETRIC);

    let root = storage.root_horizontal_partition().unwrap();
    assert_eq!(root.table(), ELEMENT_TABLE);
    assert_eq!(root.filter(), &ClassIdFilter::Direct);
    assert_eq!(
        root.class_id_filter_sql("ECClassId"),
        "ECClassId=11 OR ECClassId=12"
    );

    assert_eq!(
        tables(storage.vertical_partitions()),
        vec![ELEMENT_TABLE, GEOMETRIC_TABLE]
    );
    let joined = storage.vertical_partition(GEOMETRIC_TABLE).unwrap();
    assert!(!joined.is_root());
    assert!(!joined.needs_class_id_filter());
}

#[test]
fn test_storage_partition_prefers_horizontal() {
    let cache = fixture();
    let storage = storage_of(&cache, PHYSICAL);

    let shared = storage.partition(ELEMENT_TABLE).unwrap();
    assert!(std::ptr::eq(
        shared,
        storage.horizontal_partition(ELEMENT_TABLE).unwrap()
    ));

    let overflow = storage.partition(GEOMETRIC_OVERFLOW_TABLE).unwrap();
    assert!(std::ptr::eq(
        overflow,
        storage.vertical_partition(GEOMETRIC_OVERFLOW_TABLE).unwrap()
    ));
    assert!(storage.partition(MODEL_TABLE).is_none());
}

#[test]
fn test_storage_for_mixin_has_virtual_root() {
    let cache = fixture();
    let storage = storage_of(&cache, MARKABLE);

    assert_eq!(
        tables(storage.horizontal_partitions()),
        vec![
            ELEMENT_TABLE,
            GEOMETRIC_TABLE,
            GEOMETRIC_OVERFLOW_TABLE,
            MARKABLE_TABLE,
            MODEL_TABLE
        ]
    );
    assert_eq!(
        storage.root_horizontal_partition().map(|p| p.table()),
        Some(MARKABLE_TABLE)
    );
    let physical: Vec<TableId> = storage
        .non_virtual_horizontal_partitions()
        .map(|p| p.table())
        .collect();
    assert_eq!(
        physical,
        vec![ELEMENT_TABLE, GEOMETRIC_TABLE, GEOMETRIC_OVERFLOW_TABLE, MODEL_TABLE]
    );
    assert!(storage.has_multiple_non_virtual_horizontal_partitions());
    assert!(storage.vertical_partitions().is_empty());
}

#[test]
fn test_storage_for_foreign_key_relationship() {
    let cache = fixture();
    let storage = storage_of(&cache, MODEL_OWNS_GEOMETRIC);

    assert_eq!(tables(storage.horizontal_partitions()), vec![ELEMENT_TABLE]);
    let partition = &storage.horizontal_partitions()[0];
    assert!(partition.is_root());
    assert_eq!(partition.class_ids(), &[GEOMETRIC, PHYSICAL]);
    assert_eq!(
        partition.class_id_filter_sql("ECClassId"),
        "ECClassId=11 OR ECClassId=12"
    );
    assert!(storage.vertical_partitions().is_empty());
}

#[test]
fn test_storage_for_link_table_relationship() {
    let cache = fixture();
    let storage = storage_of(&cache, ELEMENT_REFERS_TO_ELEMENTS);

    let root = storage.root_horizontal_partition().unwrap();
    assert_eq!(root.table(), LINK_TABLE);
    assert!(!root.needs_class_id_filter());
}

#[test]
fn test_every_mapped_class_has_exactly_one_root() {
    let cache = fixture();
    let classes = [
        ELEMENT,
        GEOMETRIC,
        PHYSICAL,
        ANNOTATION,
        MODEL,
        MARKABLE,
        MODEL_OWNS_GEOMETRIC,
        ELEMENT_REFERS_TO_ELEMENTS,
    ];

    for class_id in classes {
        let storage = storage_of(&cache, class_id);

        let horizontal_roots: Vec<&Partition> = storage
            .horizontal_partitions()
            .iter()
            .filter(|p| p.is_root())
            .collect();
        assert_eq!(horizontal_roots.len(), 1, "horizontal roots of class {class_id}");
        if class_id != MODEL_OWNS_GEOMETRIC {
            assert_eq!(horizontal_roots[0].root_class_id(), Some(class_id));
        }

        if !storage.vertical_partitions().is_empty() {
            let vertical_roots = storage
                .vertical_partitions()
                .iter()
                .filter(|p| p.is_root())
                .count();
            assert_eq!(vertical_roots, 1, "vertical roots of class {class_id}");
        }
    }
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "has no mapping"))]
fn test_storage_for_unmapped_class_is_empty() {
    let cache = fixture();
    let storage =
        cache.get_storage_description(&ClassMap::new(ClassId(999), MapStrategy::OwnTable));

    assert!(storage.horizontal_partitions().is_empty());
    assert!(storage.vertical_partitions().is_empty());
    assert!(storage.root_horizontal_partition().is_none());
}

// ============================================================================
// Memoization Tests
// ============================================================================

#[test]
fn test_storage_description_is_memoized() {
    let cache = fixture();

    let first = storage_of(&cache, GEOMETRIC);
    let queries = cache.metrics().metadata_queries;
    let second = cache.get_storage_description(&ClassMap::new(
        GEOMETRIC,
        MapStrategy::TablePerHierarchy,
    ));

    assert!(Arc::ptr_eq(&first, &second));
    let metrics = cache.metrics();
    assert_eq!(metrics.metadata_queries, queries);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.hits, 1);
}

#[test]
fn test_clear_forces_reload() {
    let cache = fixture();

    let first = storage_of(&cache, GEOMETRIC);
    let queries = cache.metrics().metadata_queries;
    cache.clear();
    let second = storage_of(&cache, GEOMETRIC);

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(
        tables(first.horizontal_partitions()),
        tables(second.horizontal_partitions())
    );
    let metrics = cache.metrics();
    assert!(metrics.metadata_queries > queries);
    assert_eq!(metrics.misses, 2);
    assert_eq!(metrics.clears, 1);
}

#[test]
fn test_clear_observes_metadata_changes() {
    let cache = fixture();
    assert_eq!(cache.get_classes_for_table(MODEL_TABLE), vec![MODEL]);

    cache
        .scope()
        .lock()
        .execute(
            "INSERT INTO ec_cache_ClassHasTables (ClassId, TableId) VALUES (?1, ?2)",
            [ANNOTATION.value(), MODEL_TABLE.value()],
        )
        .unwrap();

    // Stale until cleared
    assert_eq!(cache.get_classes_for_table(MODEL_TABLE), vec![MODEL]);
    cache.clear();
    assert_eq!(
        cache.get_classes_for_table(MODEL_TABLE),
        vec![ANNOTATION, MODEL]
    );
}

#[test]
fn test_concurrent_readers_share_descriptions() {
    let cache = fixture();

    let descriptions: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| storage_of(&cache, PHYSICAL)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for description in &descriptions[1..] {
        assert!(Arc::ptr_eq(&descriptions[0], description));
    }
    assert_eq!(cache.metrics().misses, 1);
}

// ============================================================================
// Tablespace Tests
// ============================================================================

#[test]
fn test_attached_table_space_is_queried() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fixture.db");
    fixture_file(&path);

    let scope = SchemaScope::in_memory(ScopeOptions::default().with_table_space("fixture")).unwrap();
    let attach_path = path.to_string_lossy().into_owned();
    scope
        .lock()
        .execute("ATTACH DATABASE ?1 AS fixture", [attach_path])
        .unwrap();
    let cache = LightweightCache::new(Arc::new(scope));

    assert_eq!(cache.get_classes_for_table(ELEMENT_TABLE), ids(&[10, 11, 12, 13]));
    let storage = storage_of(&cache, GEOMETRIC);
    assert_eq!(
        storage.root_horizontal_partition().map(|p| p.table()),
        Some(ELEMENT_TABLE)
    );

    // The main schema of the connection stays empty
    let main_rows: i64 = cache
        .scope()
        .lock()
        .query_row("SELECT COUNT(*) FROM main.ec_cache_ClassHasTables", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(main_rows, 0);
}

#[test]
fn test_open_existing_database() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("fixture.db");
    fixture_file(&path);

    let scope = SchemaScope::open(&path, ScopeOptions::default().read_only(true)).unwrap();
    assert_eq!(
        scope.find_table_by_name("ts_geometric").map(|t| t.id),
        Some(GEOMETRIC_TABLE)
    );
    let cache = LightweightCache::new(Arc::new(scope));
    assert_eq!(cache.get_vertical_partitions_for_class(MODEL).len(), 1);
}
