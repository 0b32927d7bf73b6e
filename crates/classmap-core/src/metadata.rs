//! Metadata queries behind the raw cache indexes
//!
//! Each function issues one parameterized statement against the system tables
//! of a tablespace and appends rows to `out` as they are read, so a failure
//! part-way leaves the rows read so far in place.

use crate::schema::{MIXIN_CLASS_NAME, MIXIN_SCHEMA_NAME};
use crate::types::{ClassId, RelationshipEnd, TableId, TableKind};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Classes whose instances occupy `table`, ascending and distinct
pub(crate) fn classes_for_table(
    conn: &Connection,
    table_space: &str,
    table: TableId,
    out: &mut Vec<ClassId>,
) -> SqliteResult<()> {
    let sql = format!(
        "SELECT DISTINCT ClassId FROM [{ts}].ec_cache_ClassHasTables WHERE TableId = ?1 ORDER BY ClassId",
        ts = table_space
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query([table.0])?;
    while let Some(row) = rows.next()? {
        out.push(ClassId(row.get(0)?));
    }
    Ok(())
}

/// Every table a class's own instances are spread over
pub(crate) fn tables_for_class(
    conn: &Connection,
    table_space: &str,
    class_id: ClassId,
    out: &mut BTreeSet<TableId>,
) -> SqliteResult<()> {
    let sql = format!(
        "SELECT DISTINCT TableId FROM [{ts}].ec_cache_ClassHasTables WHERE ClassId = ?1",
        ts = table_space
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query([class_id.0])?;
    while let Some(row) = rows.next()? {
        out.insert(TableId(row.get(0)?));
    }
    Ok(())
}

/// True if the class carries the `CoreCustomAttributes:IsMixin` custom attribute
pub(crate) fn is_mixin(
    conn: &Connection,
    table_space: &str,
    class_id: ClassId,
) -> SqliteResult<bool> {
    let sql = format!(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM [{ts}].ec_CustomAttribute ca
            JOIN [{ts}].ec_Class c ON c.Id = ca.ClassId
            JOIN [{ts}].ec_Schema s ON s.Id = c.SchemaId
            WHERE ca.ContainerId = ?1 AND c.Name = ?2 AND s.Name = ?3
        )
        "#,
        ts = table_space
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.query_row(
        params![class_id.0, MIXIN_CLASS_NAME, MIXIN_SCHEMA_NAME],
        |row| row.get(0),
    )
}

/// Per table, the part of `class_id`'s hierarchy stored there.
///
/// Lists are ascending except that `class_id` itself comes first in the
/// table holding it. Joined, overflow and virtual tables are skipped unless
/// `all_table_kinds` is set.
pub(crate) fn horizontal_tables_for_class(
    conn: &Connection,
    table_space: &str,
    class_id: ClassId,
    all_table_kinds: bool,
    out: &mut BTreeMap<TableId, Vec<ClassId>>,
) -> SqliteResult<()> {
    let sql = format!(
        r#"
        SELECT ct.TableId, ct.ClassId, t.Type
        FROM [{ts}].ec_cache_ClassHasTables ct
        JOIN [{ts}].ec_Table t ON t.Id = ct.TableId
        WHERE ct.ClassId IN (
                SELECT ?1
                UNION
                SELECT ClassId FROM [{ts}].ec_cache_ClassHierarchy WHERE BaseClassId = ?1)
        ORDER BY ct.TableId, ct.ClassId <> ?1, ct.ClassId
        "#,
        ts = table_space
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query([class_id.0])?;
    while let Some(row) = rows.next()? {
        let kind = TableKind::from_i64(row.get(2)?);
        if !all_table_kinds && kind.is_some_and(TableKind::is_split_or_virtual) {
            continue;
        }
        let table = TableId(row.get(0)?);
        let derived = ClassId(row.get(1)?);
        let classes = out.entry(table).or_default();
        if classes.last() != Some(&derived) {
            classes.push(derived);
        }
    }
    Ok(())
}

/// Constraint classes of a relationship, expanded over polymorphic constraints
pub(crate) fn constraint_classes_for_relationship(
    conn: &Connection,
    table_space: &str,
    relationship_class_id: ClassId,
    out: &mut BTreeMap<ClassId, RelationshipEnd>,
) -> SqliteResult<()> {
    let sql = format!(
        r#"
        SELECT rcc.ClassId, rc.RelationshipEnd
        FROM [{ts}].ec_RelationshipConstraint rc
        JOIN [{ts}].ec_RelationshipConstraintClass rcc ON rcc.ConstraintId = rc.Id
        WHERE rc.RelationshipClassId = ?1
        UNION
        SELECT h.ClassId, rc.RelationshipEnd
        FROM [{ts}].ec_RelationshipConstraint rc
        JOIN [{ts}].ec_RelationshipConstraintClass rcc ON rcc.ConstraintId = rc.Id
        JOIN [{ts}].ec_cache_ClassHierarchy h ON h.BaseClassId = rcc.ClassId
        WHERE rc.RelationshipClassId = ?1 AND rc.IsPolymorphic <> 0
        "#,
        ts = table_space
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query([relationship_class_id.0])?;
    while let Some(row) = rows.next()? {
        let class_id = ClassId(row.get(0)?);
        merge_end(out, class_id, row.get(1)?, relationship_class_id);
    }
    Ok(())
}

/// Relationship classes whose constraints admit `class_id`
pub(crate) fn relationships_for_class(
    conn: &Connection,
    table_space: &str,
    class_id: ClassId,
    out: &mut BTreeMap<ClassId, RelationshipEnd>,
) -> SqliteResult<()> {
    let sql = format!(
        r#"
        SELECT rc.RelationshipClassId, rc.RelationshipEnd
        FROM [{ts}].ec_RelationshipConstraint rc
        JOIN [{ts}].ec_RelationshipConstraintClass rcc ON rcc.ConstraintId = rc.Id
        WHERE rcc.ClassId = ?1
        UNION
        SELECT rc.RelationshipClassId, rc.RelationshipEnd
        FROM [{ts}].ec_RelationshipConstraint rc
        JOIN [{ts}].ec_RelationshipConstraintClass rcc ON rcc.ConstraintId = rc.Id
        JOIN [{ts}].ec_cache_ClassHierarchy h ON h.BaseClassId = rcc.ClassId
        WHERE h.ClassId = ?1 AND rc.IsPolymorphic <> 0
        "#,
        ts = table_space
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query([class_id.0])?;
    while let Some(row) = rows.next()? {
        let relationship_class_id = ClassId(row.get(0)?);
        merge_end(out, relationship_class_id, row.get(1)?, relationship_class_id);
    }
    Ok(())
}

fn merge_end(
    out: &mut BTreeMap<ClassId, RelationshipEnd>,
    key: ClassId,
    raw_end: i64,
    relationship_class_id: ClassId,
) {
    let Some(end) = RelationshipEnd::from_db(raw_end) else {
        warn!(
            "Relationship {} has a constraint with unknown end {}",
            relationship_class_id, raw_end
        );
        return;
    };
    out.entry(key)
        .and_modify(|existing| *existing = existing.merge(end))
        .or_insert(end);
}
