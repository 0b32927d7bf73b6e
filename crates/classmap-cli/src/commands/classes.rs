//! Classes command - classes stored in a table

use anyhow::Result;
use clap::Args;
use classmap_core::LightweightCache;

use super::{resolve_table, table_name};

#[derive(Args, Debug)]
pub struct ClassesArgs {
    /// Table id or name
    table: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn execute(args: ClassesArgs, cache: &LightweightCache) -> Result<()> {
    let table = resolve_table(cache, &args.table)?;
    let classes = cache.get_classes_for_table(table);

    if args.json {
        let output = serde_json::json!({
            "table": table,
            "name": table_name(cache, table),
            "classes": classes,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if classes.is_empty() {
        println!("No classes stored in {}", table_name(cache, table));
        return Ok(());
    }
    for class_id in classes {
        println!("{class_id}");
    }
    Ok(())
}
