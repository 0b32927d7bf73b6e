//! Relationship commands - constraint classes and their reverse index

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use classmap_core::{ClassId, LightweightCache, RelationshipEnd};

#[derive(Args, Debug)]
pub struct ConstraintsArgs {
    /// Relationship class id
    relationship_class_id: i64,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct RelationshipsArgs {
    /// Class id
    class_id: i64,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn execute_constraints(args: ConstraintsArgs, cache: &LightweightCache) -> Result<()> {
    let classes =
        cache.get_constraint_classes_for_relationship_class(ClassId(args.relationship_class_id));
    print_ends(&classes, args.json)
}

pub fn execute_relationships(args: RelationshipsArgs, cache: &LightweightCache) -> Result<()> {
    let relationships = cache.get_relationships_for_class(ClassId(args.class_id));
    print_ends(&relationships, args.json)
}

fn print_ends(ends: &BTreeMap<ClassId, RelationshipEnd>, json: bool) -> Result<()> {
    if json {
        let output: Vec<_> = ends
            .iter()
            .map(|(class_id, end)| serde_json::json!({ "class_id": class_id, "end": end }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (class_id, end) in ends {
        println!("{class_id}\t{end}");
    }
    Ok(())
}
