//! Partition: one table paired with the subset of classes a query wants from it
//!
//! A shared table can hold dozens of sibling classes. The filter restricting a
//! query to the partition's classes is rendered either as an equality
//! disjunction over the partition's class ids or as an inequality conjunction
//! over the table's remaining class ids, whichever has fewer literals.

use crate::types::{ClassId, TableId};
use serde::Serialize;
use std::fmt::Write;

/// How a partition's class-id predicate is encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "class_ids", rename_all = "lowercase")]
pub enum ClassIdFilter {
    /// `col=a OR col=b ...` over the partition's own class ids
    Direct,
    /// `col<>x AND col<>y ...` over the table's class ids absent from the partition
    Inverse(Vec<ClassId>),
    /// The partition covers every class stored in the table
    Unfiltered,
}

/// A table paired with a non-empty subset of the classes it stores
#[derive(Debug, Clone, Serialize)]
pub struct Partition {
    table: TableId,
    is_root: bool,
    class_ids: Vec<ClassId>,
    filter: ClassIdFilter,
}

impl Partition {
    pub fn new(table: TableId, is_root: bool) -> Self {
        Self {
            table,
            is_root,
            class_ids: Vec::new(),
            filter: ClassIdFilter::Direct,
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Class ids in insertion order
    pub fn class_ids(&self) -> &[ClassId] {
        &self.class_ids
    }

    /// The first class added, which for a root partition is the class itself
    pub fn root_class_id(&self) -> Option<ClassId> {
        self.class_ids.first().copied()
    }

    pub fn filter(&self) -> &ClassIdFilter {
        &self.filter
    }

    pub fn add_class_id(&mut self, class_id: ClassId) {
        self.class_ids.push(class_id);
    }

    /// Choose the smaller predicate encoding against the table's full class list.
    ///
    /// `universe` must be sorted ascending without duplicates.
    pub fn generate_class_id_filter(&mut self, universe: &[ClassId]) {
        debug_assert!(
            universe.windows(2).all(|w| w[0] < w[1]),
            "class universe of table {} is not strictly ascending",
            self.table
        );
        debug_assert!(
            !self.class_ids.is_empty(),
            "partition for table {} has no classes",
            self.table
        );

        let use_inverse = self.class_ids.len() > universe.len() / 2;
        if !use_inverse {
            self.filter = ClassIdFilter::Direct;
            return;
        }
        if self.class_ids.len() == universe.len() && self.covers(universe) {
            self.filter = ClassIdFilter::Unfiltered;
            return;
        }

        let mut sorted = self.class_ids.clone();
        sorted.sort_unstable();
        sorted.dedup();

        // Sorted set difference: universe \ class_ids
        let mut inverse = Vec::with_capacity(universe.len().saturating_sub(sorted.len()));
        let mut mine = sorted.iter().peekable();
        for &candidate in universe {
            while mine.next_if(|&&id| id < candidate).is_some() {}
            if mine.next_if_eq(&&candidate).is_none() {
                inverse.push(candidate);
            }
        }

        self.filter = if inverse.is_empty() {
            ClassIdFilter::Unfiltered
        } else {
            ClassIdFilter::Inverse(inverse)
        };
    }

    fn covers(&self, universe: &[ClassId]) -> bool {
        self.class_ids
            .iter()
            .all(|id| universe.binary_search(id).is_ok())
    }

    /// False only when the partition matches every row of its table
    pub fn needs_class_id_filter(&self) -> bool {
        self.filter != ClassIdFilter::Unfiltered
    }

    /// Append the class-id predicate over `column` to `out`.
    ///
    /// Appends nothing when the partition covers the whole table.
    pub fn append_class_id_filter_sql(&self, out: &mut String, column: &str) {
        match &self.filter {
            ClassIdFilter::Unfiltered => {}
            ClassIdFilter::Inverse(excluded) => append_joined(out, column, "<>", " AND ", excluded),
            ClassIdFilter::Direct => append_joined(out, column, "=", " OR ", &self.class_ids),
        }
    }

    /// The class-id predicate over `column` as a new string
    pub fn class_id_filter_sql(&self, column: &str) -> String {
        let mut sql = String::new();
        self.append_class_id_filter_sql(&mut sql, column);
        sql
    }

    /// Number of class-id literals the predicate contains
    pub fn filter_literal_count(&self) -> usize {
        match &self.filter {
            ClassIdFilter::Unfiltered => 0,
            ClassIdFilter::Inverse(excluded) => excluded.len(),
            ClassIdFilter::Direct => self.class_ids.len(),
        }
    }
}

fn append_joined(out: &mut String, column: &str, op: &str, separator: &str, ids: &[ClassId]) {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        // Writing to a String cannot fail
        let _ = write!(out, "{column}{op}{id}");
    }
}
