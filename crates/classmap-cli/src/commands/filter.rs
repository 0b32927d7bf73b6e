//! Filter command - class-id predicates per partition
//!
//! Prints one line per physical horizontal partition, in the form the query
//! generator splices into a `WHERE` clause.

use anyhow::Result;
use clap::Args;
use classmap_core::LightweightCache;

use super::{class_id_column, storage_description, table_name};

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Class id
    class_id: i64,

    /// Class-id column to filter on (defaults to each table's own)
    #[arg(long)]
    column: Option<String>,
}

pub fn execute(args: FilterArgs, cache: &LightweightCache) -> Result<()> {
    let storage = storage_description(cache, args.class_id)?;

    for partition in storage.non_virtual_horizontal_partitions() {
        let column = match args.column {
            Some(ref column) => column.clone(),
            None => class_id_column(cache, partition.table()),
        };

        let predicate = if partition.needs_class_id_filter() {
            partition.class_id_filter_sql(&column)
        } else {
            "(all rows)".to_string()
        };
        println!("{}: {}", table_name(cache, partition.table()), predicate);
    }
    Ok(())
}
