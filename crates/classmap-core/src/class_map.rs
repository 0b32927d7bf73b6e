//! Class maps as seen by the partition cache
//!
//! The cache only needs to know which class a map belongs to and whether the
//! class is a relationship persisted as a foreign key in one of its end tables.
//! For the latter, a [`ForeignKeyPartitionView`] lists the physical tables
//! holding the foreign key.

use crate::cache::LightweightCache;
use crate::scope::{ScopeError, SchemaScope};
use crate::types::{ClassId, RelationshipEnd, TableId, TableKind};
use rusqlite::OptionalExtension;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// Mapping strategy stored in `ec_ClassMap.MapStrategy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapStrategy {
    NotMapped,
    OwnTable,
    TablePerHierarchy,
    ExistingTable,
    ForeignKeyRelationshipInTargetTable,
    ForeignKeyRelationshipInSourceTable,
}

impl MapStrategy {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::NotMapped),
            1 => Some(Self::OwnTable),
            2 => Some(Self::TablePerHierarchy),
            3 => Some(Self::ExistingTable),
            10 => Some(Self::ForeignKeyRelationshipInTargetTable),
            11 => Some(Self::ForeignKeyRelationshipInSourceTable),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::NotMapped => 0,
            Self::OwnTable => 1,
            Self::TablePerHierarchy => 2,
            Self::ExistingTable => 3,
            Self::ForeignKeyRelationshipInTargetTable => 10,
            Self::ForeignKeyRelationshipInSourceTable => 11,
        }
    }

    /// End whose table carries the foreign key, for foreign-key relationships
    pub fn persisted_end(self) -> Option<RelationshipEnd> {
        match self {
            Self::ForeignKeyRelationshipInTargetTable => Some(RelationshipEnd::Target),
            Self::ForeignKeyRelationshipInSourceTable => Some(RelationshipEnd::Source),
            _ => None,
        }
    }
}

/// Physical tables of a relationship mapped as a foreign key on an end table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyPartitionView {
    persisted_end: RelationshipEnd,
    tables: Vec<TableId>,
}

impl ForeignKeyPartitionView {
    /// `persisted_end` must be `Source` or `Target`
    pub fn new(persisted_end: RelationshipEnd, tables: Vec<TableId>) -> Self {
        debug_assert!(
            persisted_end != RelationshipEnd::Both,
            "a foreign key is persisted on exactly one end"
        );
        Self {
            persisted_end,
            tables,
        }
    }

    pub fn persisted_end(&self) -> RelationshipEnd {
        self.persisted_end
    }

    /// Tables holding the foreign key column
    pub fn physical_tables(&self) -> &[TableId] {
        &self.tables
    }
}

/// How a class is mapped, as far as storage assembly cares
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClassMapping {
    /// Entity or link-table relationship stored in its own or a shared table
    Table { strategy: MapStrategy },
    /// Relationship stored as a foreign key in its persisted end's tables
    ForeignKeyRelationship { view: ForeignKeyPartitionView },
}

/// A class together with its mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassMap {
    class_id: ClassId,
    mapping: ClassMapping,
}

impl ClassMap {
    /// A class stored in tables of its own hierarchy
    pub fn new(class_id: ClassId, strategy: MapStrategy) -> Self {
        Self {
            class_id,
            mapping: ClassMapping::Table { strategy },
        }
    }

    /// A relationship persisted as a foreign key
    pub fn foreign_key_relationship(class_id: ClassId, view: ForeignKeyPartitionView) -> Self {
        Self {
            class_id,
            mapping: ClassMapping::ForeignKeyRelationship { view },
        }
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn mapping(&self) -> &ClassMapping {
        &self.mapping
    }

    pub fn foreign_key_view(&self) -> Option<&ForeignKeyPartitionView> {
        match &self.mapping {
            ClassMapping::ForeignKeyRelationship { view } => Some(view),
            ClassMapping::Table { .. } => None,
        }
    }

    /// Load a class map from `ec_ClassMap`.
    ///
    /// For foreign-key relationships the view is derived from the persisted
    /// end's constraint classes: every non-virtual primary or existing table
    /// one of them is stored in. Returns `None` for an unmapped class id.
    pub fn load(
        scope: &SchemaScope,
        cache: &LightweightCache,
        class_id: ClassId,
    ) -> Result<Option<Self>, ScopeError> {
        let strategy = {
            let conn = scope.lock();
            let sql = format!(
                "SELECT MapStrategy FROM [{}].ec_ClassMap WHERE ClassId = ?1",
                scope.table_space()
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let strategy = stmt
                .query_row([class_id.0], |row| row.get::<_, i64>(0))
                .optional()?;
            strategy
        };

        let Some(raw) = strategy else {
            return Ok(None);
        };
        let Some(strategy) = MapStrategy::from_i64(raw) else {
            debug!("Class {} has unknown map strategy {}", class_id, raw);
            return Ok(None);
        };

        let Some(persisted_end) = strategy.persisted_end() else {
            return Ok(Some(Self::new(class_id, strategy)));
        };

        let mut tables = BTreeSet::new();
        for (constraint_class, end) in cache.get_constraint_classes_for_relationship_class(class_id)
        {
            if !end.contains(persisted_end) {
                continue;
            }
            for table in cache.get_vertical_partitions_for_class(constraint_class) {
                let is_end_table = scope
                    .find_table(table)
                    .is_some_and(|t| matches!(t.kind, TableKind::Primary | TableKind::Existing));
                if is_end_table {
                    tables.insert(table);
                }
            }
        }

        debug!(
            "Foreign key relationship {} persisted in {} table(s) on its {} end",
            class_id,
            tables.len(),
            persisted_end
        );
        Ok(Some(Self::foreign_key_relationship(
            class_id,
            ForeignKeyPartitionView::new(persisted_end, tables.into_iter().collect()),
        )))
    }
}
