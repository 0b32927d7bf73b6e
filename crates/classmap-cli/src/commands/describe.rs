//! Describe command - storage description of a class

use anyhow::Result;
use clap::Args;
use classmap_core::{LightweightCache, Partition};
use serde_json::{json, Value};

use super::{class_id_column, storage_description, table_name};

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Class id
    class_id: i64,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn execute(args: DescribeArgs, cache: &LightweightCache) -> Result<()> {
    let storage = storage_description(cache, args.class_id)?;

    if args.json {
        let output = json!({
            "class_id": storage.class_id(),
            "class_ids": storage.class_ids(),
            "horizontal": storage
                .horizontal_partitions()
                .iter()
                .map(|p| partition_json(cache, p))
                .collect::<Vec<_>>(),
            "vertical": storage
                .vertical_partitions()
                .iter()
                .map(|p| partition_json(cache, p))
                .collect::<Vec<_>>(),
            "root_table": storage.root_horizontal_partition().map(|p| p.table()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Class {}", storage.class_id());
    println!("\nHorizontal partitions:");
    for partition in storage.horizontal_partitions() {
        print_partition(cache, partition);
    }
    if !storage.vertical_partitions().is_empty() {
        println!("\nVertical partitions:");
        for partition in storage.vertical_partitions() {
            print_partition(cache, partition);
        }
    }
    if storage.root_horizontal_partition().is_none() {
        println!("\n(no root partition)");
    }
    Ok(())
}

fn print_partition(cache: &LightweightCache, partition: &Partition) {
    let classes: Vec<String> = partition
        .class_ids()
        .iter()
        .map(|id| id.to_string())
        .collect();
    let predicate = if partition.needs_class_id_filter() {
        partition.class_id_filter_sql(&class_id_column(cache, partition.table()))
    } else {
        "(all rows)".to_string()
    };
    println!(
        "  {} {} [{}]  classes: {}  filter: {}",
        if partition.is_root() { "*" } else { "-" },
        table_name(cache, partition.table()),
        partition.table(),
        classes.join(", "),
        predicate
    );
}

fn partition_json(cache: &LightweightCache, partition: &Partition) -> Value {
    json!({
        "table": partition.table(),
        "name": table_name(cache, partition.table()),
        "root": partition.is_root(),
        "class_ids": partition.class_ids(),
        "filter": partition.filter(),
        "literals": partition.filter_literal_count(),
    })
}
