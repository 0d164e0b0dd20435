//! Thin wrappers around the external MongoDB collaborators: command
//! construction for the bulk import tool and a handful of canned
//! aggregations run through the shell. None of the pipeline logic lives
//! here; the only contract with the pipeline is "one document per line".

use std::path::Path;
use std::process::Command;

use log::info;
use serde_json::{json, Value};

use crate::errors::Result;

pub struct ImportTarget {
    pub host: String,
    pub db: String,
    pub collection: String,
}

/// Build the mongoimport invocation for a line-delimited document file.
/// `--drop` gives the drop-and-recreate semantics expected on a re-run.
pub fn mongoimport_command(target: &ImportTarget, documents: &Path) -> Command {
    let mut command = Command::new("mongoimport");
    command
        .arg("-h").arg(&target.host)
        .arg("--db").arg(&target.db)
        .arg("--collection").arg(&target.collection)
        .arg("--drop")
        .arg("--file").arg(documents);
    command
}

pub fn run_import(target: &ImportTarget, documents: &Path) -> Result<()> {
    let mut command = mongoimport_command(target, documents);
    info!(
        db = target.db,
        collection = target.collection,
        file = documents.display().to_string();
        "Running mongoimport"
    );
    let status = command.status()?;
    if !status.success() {
        return Err(format!("mongoimport exited with {}", status).into());
    }
    Ok(())
}

/// The exploratory group/sort/limit aggregations, by name.
pub fn aggregations() -> Vec<(&'static str, Value)> {
    vec![
        ("top-contributors", json!([
            {"$group": {"_id": "$created.user", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 5},
        ])),
        ("single-edit-contributors", json!([
            {"$group": {"_id": "$created.user", "count": {"$sum": 1}}},
            {"$group": {"_id": "$count", "num_users": {"$sum": 1}}},
            {"$sort": {"_id": 1}},
            {"$limit": 1},
        ])),
        ("postcodes", json!([
            {"$match": {"address.postcode": {"$exists": 1}}},
            {"$group": {"_id": "$address.postcode", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 10},
        ])),
        ("streets", json!([
            {"$match": {"address.street": {"$exists": 1}}},
            {"$group": {"_id": "$address.street", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 10},
        ])),
        ("cities", json!([
            {"$group": {"_id": "$address.city", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 10},
        ])),
        ("amenities", json!([
            {"$group": {"_id": "$amenity", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 10},
        ])),
        ("religions", json!([
            {"$match": {"amenity": "place_of_worship"}},
            {"$group": {"_id": "$religion", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 5},
        ])),
        ("restaurants", json!([
            {"$match": {"amenity": "restaurant"}},
            {"$group": {"_id": "$name", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 10},
        ])),
        ("cuisines", json!([
            {"$match": {"amenity": "restaurant"}},
            {"$group": {"_id": "$cuisine", "count": {"$sum": 1}}},
            {"$sort": {"count": -1}},
            {"$limit": 5},
        ])),
    ]
}

pub fn mongosh_command(target: &ImportTarget, pipeline: &Value) -> Command {
    let eval = format!(
        "JSON.stringify(db.getCollection('{}').aggregate({}).toArray(), null, 2)",
        target.collection, pipeline,
    );
    let mut command = Command::new("mongosh");
    command
        .arg(format!("mongodb://{}/{}", target.host, target.db))
        .arg("--quiet")
        .arg("--eval").arg(eval);
    command
}

/// Run one named aggregation, or all of them when `query` is None.
pub fn run_explore(target: &ImportTarget, query: Option<&str>) -> Result<()> {
    let mut matched = false;
    for (name, pipeline) in aggregations() {
        if query.is_some_and(|wanted| wanted != name) {
            continue;
        }
        matched = true;
        println!("== {} ==", name);
        let status = mongosh_command(target, &pipeline).status()?;
        if !status.success() {
            return Err(format!("mongosh exited with {}", status).into());
        }
    }
    if !matched {
        let known: Vec<&str> = aggregations().iter().map(|(name, _)| *name).collect();
        return Err(format!(
            "unknown query '{}'; known queries: {}",
            query.unwrap_or(""),
            known.join(", "),
        ).into());
    }
    Ok(())
}
