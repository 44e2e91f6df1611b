use serde_json::Value;

use super::normalize::SchemaMismatch;
use super::repair::{repair_and_parse, ParseFailure};
use super::sanitize::strip_code_fences;
use super::types::SpecimenCensus;
use super::StructuringError;

/// Sanitize then repair a raw backend reply into a JSON value.
pub fn parse_json_reply(raw: &str) -> Result<Value, ParseFailure> {
    let cleaned = strip_code_fences(raw);
    repair_and_parse(&cleaned)
}

/// Parse the census pass reply.
///
/// The count is never below 1 nor below the number of names returned.
pub fn parse_census_response(raw: &str) -> Result<SpecimenCensus, StructuringError> {
    let value = parse_json_reply(raw)?;
    let object = value
        .as_object()
        .ok_or_else(|| SchemaMismatch::new("census reply is not an object"))?;

    let names: Vec<String> = string_list(object.get("specimen_names"))
        .iter()
        .map(|name| clean_specimen_name(name))
        .collect();
    let texts = string_list(object.get("specimen_text"));

    let reported = object
        .get("number_of_specimens")
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(1) as usize;

    Ok(SpecimenCensus {
        count: reported.max(names.len()).max(1),
        names,
        texts,
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Keep the part before any colon, drop commas, collapse whitespace.
pub fn clean_specimen_name(name: &str) -> String {
    let head = name.split(':').next().unwrap_or_default();
    head.replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
