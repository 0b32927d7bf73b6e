//! CLI command implementations
//!
//! Every command runs against one [`LightweightCache`] opened from the
//! merged configuration.

pub mod classes;
pub mod describe;
pub mod filter;
pub mod relationships;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use classmap_config::{ClassMapConfig, ConfigLoader};
use classmap_core::{
    ClassId, ClassMap, LightweightCache, SchemaScope, ScopeOptions, StorageDescription, TableId,
    DEFAULT_TABLE_SPACE,
};
use tracing::debug;

use crate::GlobalOptions;

/// Column name used when a table has no known class-id column
const DEFAULT_CLASS_ID_COLUMN: &str = "ECClassId";

/// Load configuration: global → local → `--config` file → command-line flags.
pub fn load_config(global: &GlobalOptions) -> Result<ClassMapConfig> {
    let workspace = std::env::current_dir().context("Failed to get current directory")?;
    let overrides = global.to_config_overrides();

    ConfigLoader::new()
        .load_with_file(&workspace, global.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")
}

/// Open the configured database and wrap it in a fresh cache.
pub fn open_cache(config: &ClassMapConfig, global: &GlobalOptions) -> Result<LightweightCache> {
    let workspace = std::env::current_dir().context("Failed to get current directory")?;
    let Some(path) = config.database_path(&workspace) else {
        bail!("No metadata database configured (pass --db or set database.path)");
    };
    if !path.exists() {
        bail!("Metadata database not found: {}", path.display());
    }

    let options = ScopeOptions {
        table_space: config.cache.table_space.clone(),
        statement_cache_capacity: config.cache.statement_cache_capacity,
        read_only: config.database.read_only,
    };
    let scope = SchemaScope::open(&path, options)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    if let Some(ref attach) = global.attach {
        if scope.table_space() == DEFAULT_TABLE_SPACE {
            bail!("--attach needs a --table-space other than '{DEFAULT_TABLE_SPACE}'");
        }
        let sql = format!("ATTACH DATABASE ?1 AS [{}]", scope.table_space());
        scope
            .lock()
            .execute(&sql, [attach.to_string_lossy().into_owned()])
            .with_context(|| format!("Failed to attach {}", attach.display()))?;
        debug!("Attached {} as [{}]", attach.display(), scope.table_space());
    }

    ensure_table_space(&scope)?;
    Ok(LightweightCache::new(Arc::new(scope)))
}

/// Fail early if the table space is not a schema of the connection
fn ensure_table_space(scope: &SchemaScope) -> Result<()> {
    let attached: Vec<String> = {
        let conn = scope.lock();
        let mut stmt = conn.prepare("SELECT name FROM pragma_database_list")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        names
    };

    if !attached
        .iter()
        .any(|name| name.eq_ignore_ascii_case(scope.table_space()))
    {
        bail!(
            "Table space '{}' is not attached (available: {})",
            scope.table_space(),
            attached.join(", ")
        );
    }
    Ok(())
}

/// Resolve a table given by id or by name
pub fn resolve_table(cache: &LightweightCache, table: &str) -> Result<TableId> {
    let scope = cache.scope();
    let found = match table.parse::<i64>() {
        Ok(id) => scope.find_table(TableId(id)),
        Err(_) => scope.find_table_by_name(table),
    };
    match found {
        Some(table) => Ok(table.id),
        None => bail!("Table '{}' not found", table),
    }
}

/// Load the class map of `class_id` and its storage description
pub fn storage_description(
    cache: &LightweightCache,
    class_id: i64,
) -> Result<Arc<StorageDescription>> {
    let class_id = ClassId(class_id);
    let class_map = ClassMap::load(cache.scope(), cache, class_id)
        .with_context(|| format!("Failed to load class map of class {class_id}"))?;
    let Some(class_map) = class_map else {
        bail!("Class {} has no class map", class_id);
    };
    Ok(cache.get_storage_description(&class_map))
}

/// Display name of a table, falling back to its id
pub fn table_name(cache: &LightweightCache, table: TableId) -> String {
    cache
        .scope()
        .find_table(table)
        .map(|t| t.name)
        .unwrap_or_else(|| format!("#{table}"))
}

/// Class-id column of a table
pub fn class_id_column(cache: &LightweightCache, table: TableId) -> String {
    cache
        .scope()
        .find_table(table)
        .and_then(|t| t.class_id_column)
        .unwrap_or_else(|| DEFAULT_CLASS_ID_COLUMN.to_string())
}
