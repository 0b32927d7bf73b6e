//! Common test utilities for integration tests.
//!
//! Builds a small metadata database shaped like a real element hierarchy:
//!
//! ```text
//! Element (10)            ts_Element (1, primary)
//! ├── Geometric (11)      + ts_Geometric (2, joined)
//! │   └── Physical (12)   + ts_Geometric_Overflow (3, overflow)   [Markable]
//! └── Annotation (13)
//! Model (14)              ts_Model (5, primary)                   [Markable]
//! Markable (16, mixin)    ts_Markable (4, virtual)
//! ModelOwnsGeometric (17)        FK in target table
//! ElementRefersToElements (18)   ts_ElementRefersToElements (6, link table)
//! ```

#![allow(dead_code)]

use classmap_core::{ClassId, LightweightCache, SchemaScope, ScopeOptions, TableId};
use std::path::Path;
use std::sync::Arc;

pub const ELEMENT: ClassId = ClassId(10);
pub const GEOMETRIC: ClassId = ClassId(11);
pub const PHYSICAL: ClassId = ClassId(12);
pub const ANNOTATION: ClassId = ClassId(13);
pub const MODEL: ClassId = ClassId(14);
pub const IS_MIXIN: ClassId = ClassId(15);
pub const MARKABLE: ClassId = ClassId(16);
pub const MODEL_OWNS_GEOMETRIC: ClassId = ClassId(17);
pub const ELEMENT_REFERS_TO_ELEMENTS: ClassId = ClassId(18);

pub const ELEMENT_TABLE: TableId = TableId(1);
pub const GEOMETRIC_TABLE: TableId = TableId(2);
pub const GEOMETRIC_OVERFLOW_TABLE: TableId = TableId(3);
pub const MARKABLE_TABLE: TableId = TableId(4);
pub const MODEL_TABLE: TableId = TableId(5);
pub const LINK_TABLE: TableId = TableId(6);

pub const FIXTURE_SQL: &str = r#"
INSERT INTO ec_Schema (Id, Name) VALUES (1, 'Fixture'), (2, 'CoreCustomAttributes');

INSERT INTO ec_Class (Id, SchemaId, Name, Type, Modifier) VALUES
    (10, 1, 'Element', 0, 1),
    (11, 1, 'Geometric', 0, 1),
    (12, 1, 'Physical', 0, 0),
    (13, 1, 'Annotation', 0, 0),
    (14, 1, 'Model', 0, 0),
    (15, 2, 'IsMixin', 3, 2),
    (16, 1, 'Markable', 0, 1),
    (17, 1, 'ModelOwnsGeometric', 1, 2),
    (18, 1, 'ElementRefersToElements', 1, 0);

INSERT INTO ec_ClassHasBaseClasses (ClassId, BaseClassId, Ordinal) VALUES
    (11, 10, 0),
    (12, 11, 0),
    (12, 16, 1),
    (13, 10, 0),
    (14, 16, 0);

INSERT INTO ec_CustomAttribute (ContainerId, ClassId) VALUES (16, 15);

INSERT INTO ec_Table (Id, Name, Type, ParentTableId) VALUES
    (1, 'ts_Element', 0, NULL),
    (2, 'ts_Geometric', 1, 1),
    (3, 'ts_Geometric_Overflow', 3, 2),
    (4, 'ts_Markable', 4, NULL),
    (5, 'ts_Model', 0, NULL),
    (6, 'ts_ElementRefersToElements', 0, NULL);

INSERT INTO ec_Column (TableId, Name, ColumnKind) VALUES
    (1, 'Id', 1), (1, 'ECClassId', 2),
    (2, 'ElementId', 1), (2, 'ECClassId', 2),
    (3, 'ElementId', 1),
    (4, 'Id', 1), (4, 'ECClassId', 2),
    (5, 'Id', 1), (5, 'ECClassId', 2),
    (6, 'Id', 1), (6, 'ECClassId', 2);

INSERT INTO ec_cache_ClassHasTables (ClassId, TableId) VALUES
    (10, 1),
    (11, 1), (11, 2),
    (12, 1), (12, 2), (12, 3),
    (13, 1),
    (14, 5),
    (16, 4),
    (18, 6);

INSERT INTO ec_ClassMap (ClassId, MapStrategy) VALUES
    (10, 2), (11, 2), (12, 2), (13, 2),
    (14, 1),
    (16, 2),
    (17, 10),
    (18, 1);

INSERT INTO ec_RelationshipConstraint (Id, RelationshipClassId, RelationshipEnd, IsPolymorphic) VALUES
    (1, 17, 0, 1),
    (2, 17, 1, 1),
    (3, 18, 0, 1),
    (4, 18, 1, 1);

INSERT INTO ec_RelationshipConstraintClass (ConstraintId, ClassId) VALUES
    (1, 14),
    (2, 11),
    (3, 10),
    (4, 10);
"#;

/// Insert the fixture rows and rebuild the hierarchy closure
pub fn populate(scope: &SchemaScope) {
    scope
        .lock()
        .execute_batch(FIXTURE_SQL)
        .expect("Failed to insert fixture rows");
    scope
        .repopulate_class_hierarchy_cache()
        .expect("Failed to build class hierarchy");
}

/// In-memory fixture database with a fresh cache
pub fn fixture() -> LightweightCache {
    let scope = SchemaScope::in_memory(ScopeOptions::default()).expect("Failed to create scope");
    populate(&scope);
    LightweightCache::new(Arc::new(scope))
}

/// On-disk fixture database, for tests that reopen or attach it
pub fn fixture_file(path: &Path) {
    let scope = SchemaScope::create(path, ScopeOptions::default()).expect("Failed to create db");
    populate(&scope);
}

pub fn ids(raw: &[i64]) -> Vec<ClassId> {
    raw.iter().copied().map(ClassId).collect()
}
