//! The JSON shape `run` reads from `--input`: a flat list of entity upserts
//! and relationship edges to push through one [`er_pipeline::Pipeline`]
//! instance. Not part of the wire contract the bus/REST layer use (spec §6) —
//! this is a local batch-ingestion convenience format for the CLI only.

use er_types::value::Value;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub entities: Vec<BatchEntity>,
    #[serde(default)]
    pub relationships: Vec<BatchRelationship>,
}

#[derive(Debug, Deserialize)]
pub struct BatchEntity {
    pub entity_type: String,
    pub source_id: String,
    pub integration: String,
    #[serde(default = "default_source_key")]
    pub source_key: String,
    #[serde(default = "default_execution_id")]
    pub execution_id: String,
    #[serde(default = "default_config_id")]
    pub config_id: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct BatchRelationship {
    pub relationship_type: String,
    pub from_entity_type: String,
    pub from_source_id: String,
    pub from_integration: String,
    pub to_entity_type: String,
    #[serde(default)]
    pub to_source_id: Option<String>,
    pub to_integration: String,
    #[serde(default = "default_value_null")]
    pub data: Value,
    #[serde(default = "default_execution_id")]
    pub execution_id: String,
}

fn default_source_key() -> String {
    "default".to_owned()
}

fn default_execution_id() -> String {
    "cli-batch".to_owned()
}

fn default_config_id() -> String {
    "cli".to_owned()
}

fn default_value_null() -> Value {
    Value::Null
}
