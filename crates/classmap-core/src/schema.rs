//! SQLite Schema Definitions for Mapping Metadata
//!
//! This module defines the read-only system tables the cache queries.
//! They are normally written by schema import; the DDL lives here so that
//! tools and tests can build a metadata database from scratch.

/// Schema version stored in `ec_Metadata`
pub const METADATA_SCHEMA_VERSION: &str = "1.0";

/// SQL to create the schema table
pub const SCHEMA_CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ec_Schema (
    Id INTEGER PRIMARY KEY,
    Name TEXT NOT NULL COLLATE NOCASE UNIQUE
)
"#;

/// SQL to create the class table
///
/// `Type`: 0 entity, 1 relationship, 2 struct, 3 custom attribute.
/// `Modifier`: 0 none, 1 abstract, 2 sealed.
pub const SCHEMA_CREATE_CLASS: &str = r#"
CREATE TABLE IF NOT EXISTS ec_Class (
    Id INTEGER PRIMARY KEY,
    SchemaId INTEGER NOT NULL REFERENCES ec_Schema(Id) ON DELETE CASCADE,
    Name TEXT NOT NULL COLLATE NOCASE,
    Type INTEGER NOT NULL DEFAULT 0,
    Modifier INTEGER NOT NULL DEFAULT 0,
    UNIQUE(SchemaId, Name)
)
"#;

/// SQL to create the direct base class table
pub const SCHEMA_CREATE_CLASS_HAS_BASE_CLASSES: &str = r#"
CREATE TABLE IF NOT EXISTS ec_ClassHasBaseClasses (
    Id INTEGER PRIMARY KEY,
    ClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    BaseClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    Ordinal INTEGER NOT NULL DEFAULT 0,
    UNIQUE(ClassId, BaseClassId)
)
"#;

/// SQL to create the class hierarchy closure
///
/// Reflexive and transitive: every class has a row with itself as base.
pub const SCHEMA_CREATE_CLASS_HIERARCHY_CACHE: &str = r#"
CREATE TABLE IF NOT EXISTS ec_cache_ClassHierarchy (
    Id INTEGER PRIMARY KEY,
    ClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    BaseClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    UNIQUE(ClassId, BaseClassId)
)
"#;

/// SQL to create the physical table list
///
/// `Type`: 0 primary, 1 joined, 2 existing, 3 overflow, 4 virtual.
pub const SCHEMA_CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ec_Table (
    Id INTEGER PRIMARY KEY,
    Name TEXT NOT NULL COLLATE NOCASE UNIQUE,
    Type INTEGER NOT NULL DEFAULT 0,
    ParentTableId INTEGER REFERENCES ec_Table(Id) ON DELETE SET NULL
)
"#;

/// SQL to create the column list
///
/// `ColumnKind` is a bit set; see [`COLUMN_KIND_CLASS_ID`].
pub const SCHEMA_CREATE_COLUMN: &str = r#"
CREATE TABLE IF NOT EXISTS ec_Column (
    Id INTEGER PRIMARY KEY,
    TableId INTEGER NOT NULL REFERENCES ec_Table(Id) ON DELETE CASCADE,
    Name TEXT NOT NULL COLLATE NOCASE,
    ColumnKind INTEGER NOT NULL DEFAULT 0,
    UNIQUE(TableId, Name)
)
"#;

/// SQL to create the class-to-table membership cache
pub const SCHEMA_CREATE_CLASS_HAS_TABLES_CACHE: &str = r#"
CREATE TABLE IF NOT EXISTS ec_cache_ClassHasTables (
    Id INTEGER PRIMARY KEY,
    ClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    TableId INTEGER NOT NULL REFERENCES ec_Table(Id) ON DELETE CASCADE,
    UNIQUE(ClassId, TableId)
)
"#;

/// SQL to create the class map table
///
/// `MapStrategy` values are listed in [`crate::class_map::MapStrategy`].
pub const SCHEMA_CREATE_CLASS_MAP: &str = r#"
CREATE TABLE IF NOT EXISTS ec_ClassMap (
    ClassId INTEGER PRIMARY KEY REFERENCES ec_Class(Id) ON DELETE CASCADE,
    MapStrategy INTEGER NOT NULL
)
"#;

/// SQL to create the relationship constraint table
///
/// `RelationshipEnd`: 0 source, 1 target.
pub const SCHEMA_CREATE_RELATIONSHIP_CONSTRAINT: &str = r#"
CREATE TABLE IF NOT EXISTS ec_RelationshipConstraint (
    Id INTEGER PRIMARY KEY,
    RelationshipClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    RelationshipEnd INTEGER NOT NULL,
    IsPolymorphic INTEGER NOT NULL DEFAULT 1,
    UNIQUE(RelationshipClassId, RelationshipEnd)
)
"#;

/// SQL to create the relationship constraint class table
pub const SCHEMA_CREATE_RELATIONSHIP_CONSTRAINT_CLASS: &str = r#"
CREATE TABLE IF NOT EXISTS ec_RelationshipConstraintClass (
    Id INTEGER PRIMARY KEY,
    ConstraintId INTEGER NOT NULL REFERENCES ec_RelationshipConstraint(Id) ON DELETE CASCADE,
    ClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    UNIQUE(ConstraintId, ClassId)
)
"#;

/// SQL to create the custom attribute table
///
/// `ClassId` is the custom attribute class, `ContainerId` the class carrying it.
pub const SCHEMA_CREATE_CUSTOM_ATTRIBUTE: &str = r#"
CREATE TABLE IF NOT EXISTS ec_CustomAttribute (
    Id INTEGER PRIMARY KEY,
    ContainerId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    ClassId INTEGER NOT NULL REFERENCES ec_Class(Id) ON DELETE CASCADE,
    UNIQUE(ContainerId, ClassId)
)
"#;

/// SQL to create the metadata key/value table
pub const SCHEMA_CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS ec_Metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes for the lookups the cache issues
pub const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS ix_ec_cache_ClassHierarchy_BaseClassId ON ec_cache_ClassHierarchy(BaseClassId);
CREATE INDEX IF NOT EXISTS ix_ec_cache_ClassHasTables_TableId ON ec_cache_ClassHasTables(TableId);
CREATE INDEX IF NOT EXISTS ix_ec_Column_TableId ON ec_Column(TableId);
CREATE INDEX IF NOT EXISTS ix_ec_RelationshipConstraintClass_ClassId ON ec_RelationshipConstraintClass(ClassId);
CREATE INDEX IF NOT EXISTS ix_ec_CustomAttribute_ClassId ON ec_CustomAttribute(ClassId);
"#;

/// All table DDL in dependency order
pub const SCHEMA_CREATE_TABLES: [&str; 12] = [
    SCHEMA_CREATE_SCHEMA,
    SCHEMA_CREATE_CLASS,
    SCHEMA_CREATE_CLASS_HAS_BASE_CLASSES,
    SCHEMA_CREATE_CLASS_HIERARCHY_CACHE,
    SCHEMA_CREATE_TABLE,
    SCHEMA_CREATE_COLUMN,
    SCHEMA_CREATE_CLASS_HAS_TABLES_CACHE,
    SCHEMA_CREATE_CLASS_MAP,
    SCHEMA_CREATE_RELATIONSHIP_CONSTRAINT,
    SCHEMA_CREATE_RELATIONSHIP_CONSTRAINT_CLASS,
    SCHEMA_CREATE_CUSTOM_ATTRIBUTE,
    SCHEMA_CREATE_METADATA,
];

/// `ec_Column.ColumnKind` bit marking the class-id column
pub const COLUMN_KIND_CLASS_ID: i64 = 2;

/// Schema holding the mixin marker custom attribute
pub const MIXIN_SCHEMA_NAME: &str = "CoreCustomAttributes";

/// Name of the mixin marker custom attribute class
pub const MIXIN_CLASS_NAME: &str = "IsMixin";

/// Rebuilds `ec_cache_ClassHierarchy` from `ec_ClassHasBaseClasses`.
///
/// `{ts}` is replaced by the tablespace name.
pub const REPOPULATE_CLASS_HIERARCHY_CACHE: &str = r#"
DELETE FROM [{ts}].ec_cache_ClassHierarchy;
WITH RECURSIVE BaseClasses(ClassId, BaseClassId) AS (
    SELECT Id, Id FROM [{ts}].ec_Class
    UNION
    SELECT BaseClasses.ClassId, b.BaseClassId
    FROM BaseClasses
    JOIN [{ts}].ec_ClassHasBaseClasses b ON b.ClassId = BaseClasses.BaseClassId
)
INSERT INTO [{ts}].ec_cache_ClassHierarchy (ClassId, BaseClassId)
SELECT DISTINCT ClassId, BaseClassId FROM BaseClasses;
"#;
