//! Storage Description: where the instances of one class live
//!
//! Horizontal partitions are the tables holding rows of the class or its
//! subclasses. Vertical partitions are the tables holding the class's
//! split-off columns, joined by primary key.

use crate::cache::LockedCache;
use crate::class_map::{ClassMap, ClassMapping, ForeignKeyPartitionView};
use crate::partition::Partition;
use crate::types::{ClassId, RelationshipEnd, TableId};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Placement plan for one class
#[derive(Debug, Clone, Serialize)]
pub struct StorageDescription {
    class_id: ClassId,
    horizontal: Vec<Partition>,
    vertical: Vec<Partition>,
    root_horizontal: Option<usize>,
    root_vertical: Option<usize>,
    non_virtual_horizontal: Vec<usize>,
    class_ids: BTreeSet<ClassId>,
}

impl StorageDescription {
    fn new(class_id: ClassId) -> Self {
        Self {
            class_id,
            horizontal: Vec::new(),
            vertical: Vec::new(),
            root_horizontal: None,
            root_vertical: None,
            non_virtual_horizontal: Vec::new(),
            class_ids: BTreeSet::new(),
        }
    }

    /// Assemble the description for `class_map`, filling raw indexes as needed
    pub(crate) fn create(class_map: &ClassMap, cache: &mut LockedCache<'_>) -> Self {
        let class_id = class_map.class_id();
        let mut description = Self::new(class_id);

        match class_map.mapping() {
            ClassMapping::ForeignKeyRelationship { view } => {
                description.add_foreign_key_partitions(view, cache);
            }
            ClassMapping::Table { .. } => {
                description.add_horizontal_partitions(cache);
                description.add_vertical_partitions(cache);
            }
        }

        for (index, partition) in description.horizontal.iter().enumerate() {
            match cache.table(partition.table()) {
                Some(table) if table.is_virtual() => {
                    if description.root_horizontal == Some(index) {
                        warn!(
                            "Root horizontal partition of class {} is the virtual table '{}'",
                            class_id, table.name
                        );
                    }
                }
                Some(_) => description.non_virtual_horizontal.push(index),
                None => {
                    debug_assert!(false, "table {} is not in ec_Table", partition.table());
                    warn!("Partition table {} of class {} is unknown", partition.table(), class_id);
                }
            }
        }

        debug!(
            "Assembled storage for class {}: {} horizontal, {} vertical partition(s)",
            class_id,
            description.horizontal.len(),
            description.vertical.len()
        );
        description
    }

    fn add_foreign_key_partitions(
        &mut self,
        view: &ForeignKeyPartitionView,
        cache: &mut LockedCache<'_>,
    ) {
        let persisted_end = view.persisted_end();
        let constraint_classes: Vec<ClassId> = cache
            .constraint_classes_for_relationship_class(self.class_id)
            .iter()
            .filter(|(_, &end)| end == RelationshipEnd::Both || end == persisted_end)
            .map(|(&id, _)| id)
            .collect();

        if constraint_classes.is_empty() {
            warn!(
                "Relationship {} has no constraint classes on its {} end",
                self.class_id, persisted_end
            );
            return;
        }

        for &table in view.physical_tables() {
            let universe = cache.classes_for_table(table).to_vec();
            let partition = self.push_horizontal(table, true);
            for &id in &constraint_classes {
                partition.add_class_id(id);
            }
            partition.generate_class_id_filter(&universe);
            self.class_ids.extend(constraint_classes.iter().copied());
        }
    }

    fn add_horizontal_partitions(&mut self, cache: &mut LockedCache<'_>) {
        let horizontal = cache.horizontal_partitions_for_class(self.class_id).clone();
        if horizontal.is_empty() {
            warn!("Class {} is not stored in any table", self.class_id);
            debug_assert!(false, "class {} has no mapping", self.class_id);
            return;
        }
        for (table, derived) in horizontal {
            let Some(&first) = derived.first() else {
                continue;
            };
            let universe = cache.classes_for_table(table).to_vec();
            let partition = self.push_horizontal(table, first == self.class_id);
            for &id in &derived {
                partition.add_class_id(id);
            }
            partition.generate_class_id_filter(&universe);
            self.class_ids.extend(derived);
        }
    }

    fn add_vertical_partitions(&mut self, cache: &mut LockedCache<'_>) {
        if self.class_ids.is_empty() {
            return;
        }
        let vertical = cache.vertical_partitions_for_class(self.class_id).clone();
        for table in vertical {
            if cache.table(table).is_none_or(|t| t.is_virtual()) {
                continue;
            }
            let universe = cache.classes_for_table(table).to_vec();
            let is_root = self.horizontal_partition(table).is_some();
            let class_ids: Vec<ClassId> = self.class_ids.iter().copied().collect();
            let partition = self.push_vertical(table, is_root);
            for id in class_ids {
                partition.add_class_id(id);
            }
            partition.generate_class_id_filter(&universe);
        }
    }

    fn push_horizontal(&mut self, table: TableId, is_root: bool) -> &mut Partition {
        if is_root && self.root_horizontal.is_none() {
            self.root_horizontal = Some(self.horizontal.len());
        }
        self.horizontal.push(Partition::new(table, is_root));
        let last = self.horizontal.len() - 1;
        &mut self.horizontal[last]
    }

    fn push_vertical(&mut self, table: TableId, is_root: bool) -> &mut Partition {
        if is_root && self.root_vertical.is_none() {
            self.root_vertical = Some(self.vertical.len());
        }
        self.vertical.push(Partition::new(table, is_root));
        let last = self.vertical.len() - 1;
        &mut self.vertical[last]
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Every class id placed in a horizontal partition
    pub fn class_ids(&self) -> &BTreeSet<ClassId> {
        &self.class_ids
    }

    pub fn horizontal_partitions(&self) -> &[Partition] {
        &self.horizontal
    }

    pub fn vertical_partitions(&self) -> &[Partition] {
        &self.vertical
    }

    pub fn horizontal_partition(&self, table: TableId) -> Option<&Partition> {
        self.horizontal.iter().find(|p| p.table() == table)
    }

    pub fn vertical_partition(&self, table: TableId) -> Option<&Partition> {
        self.vertical.iter().find(|p| p.table() == table)
    }

    /// The horizontal partition for `table`, else the vertical one
    pub fn partition(&self, table: TableId) -> Option<&Partition> {
        self.horizontal_partition(table)
            .or_else(|| self.vertical_partition(table))
    }

    /// The partition holding the class's own rows.
    ///
    /// `None` for classes without storage of their own, such as mixins.
    pub fn root_horizontal_partition(&self) -> Option<&Partition> {
        self.root_horizontal.map(|i| &self.horizontal[i])
    }

    pub fn root_vertical_partition(&self) -> Option<&Partition> {
        self.root_vertical.map(|i| &self.vertical[i])
    }

    /// Horizontal partitions whose table is physically created
    pub fn non_virtual_horizontal_partitions(&self) -> impl Iterator<Item = &Partition> {
        self.non_virtual_horizontal
            .iter()
            .map(|&i| &self.horizontal[i])
    }

    pub fn has_multiple_non_virtual_horizontal_partitions(&self) -> bool {
        self.non_virtual_horizontal.len() > 1
    }
}
