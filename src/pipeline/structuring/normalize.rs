//! Coerce a parsed backend payload into finalized specimen records.
//!
//! Order of operations per subject:
//! 1. shape check (`specimens` must be a list inside an object)
//! 2. default-filling and lenient value coercion, one record per element
//! 3. identity propagation from the census pass
//! 4. ordered override rules (condition → field overrides)
//! 5. comment length cap

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{SpecimenFeatures, SpecimenRecord, BENIGN, UNKNOWN, UNKNOWN_SPECIMEN};
use crate::config::MAX_COMMENT_LENGTH;

/// The parsed payload does not hold a `specimens` list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("schema mismatch: {0}")]
pub struct SchemaMismatch(String);

impl SchemaMismatch {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Per-subject inputs the rules may consult.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Full report text of the owning subject.
    pub report_text: &'a str,
}

/// One domain rule: when `applies` holds, `apply` rewrites fields.
pub struct OverrideRule {
    pub name: &'static str,
    pub applies: fn(&SpecimenRecord, &RuleContext<'_>) -> bool,
    pub apply: fn(&mut SpecimenRecord),
}

impl std::fmt::Debug for OverrideRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideRule").field("name", &self.name).finish()
    }
}

/// Built-in rules, in application order.
///
/// Derivation runs first so a benign report still ends up `benign`.
pub fn default_rules() -> Vec<OverrideRule> {
    vec![
        OverrideRule {
            name: "derive_score_from_pattern",
            applies: |record, _| {
                record.gleason_score == UNKNOWN && pattern_sum(&record.gleason_pattern).is_some()
            },
            apply: |record| {
                if let Some(sum) = pattern_sum(&record.gleason_pattern) {
                    record.gleason_score = sum.to_string();
                }
            },
        },
        OverrideRule {
            // Scans the whole report, not just this specimen's text.
            name: "benign_report",
            applies: |_, ctx| ctx.report_text.to_lowercase().contains(BENIGN),
            apply: |record| {
                record.gleason_score = BENIGN.to_string();
                record.gleason_pattern = BENIGN.to_string();
                record.comment = BENIGN.to_string();
            },
        },
    ]
}

/// `3+4` → 7. Both patterns must be 1–5.
fn pattern_sum(pattern: &str) -> Option<u8> {
    let (primary, secondary) = pattern.split_once('+')?;
    let primary: u8 = primary.trim().parse().ok()?;
    let secondary: u8 = secondary.trim().parse().ok()?;
    let valid = 1..=5;
    (valid.contains(&primary) && valid.contains(&secondary)).then_some(primary + secondary)
}

/// Applies default-filling, override rules, and length caps.
#[derive(Debug)]
pub struct Normalizer {
    rules: Vec<OverrideRule>,
    max_comment_length: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(default_rules(), MAX_COMMENT_LENGTH)
    }
}

impl Normalizer {
    pub fn new(rules: Vec<OverrideRule>, max_comment_length: usize) -> Self {
        Self {
            rules,
            max_comment_length,
        }
    }

    /// Append a rule after the existing ones.
    pub fn with_rule(mut self, rule: OverrideRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Normalize the `specimens` list of a parsed payload.
    ///
    /// `specimen_names` is matched positionally. An empty list yields one stub
    /// so the subject still owns a record.
    pub fn normalize(
        &self,
        payload: &Value,
        report_text: &str,
        specimen_names: &[String],
    ) -> Result<Vec<SpecimenRecord>, SchemaMismatch> {
        let elements = specimen_list(payload)?;

        let mut records: Vec<SpecimenRecord> = elements
            .iter()
            .enumerate()
            .map(|(idx, element)| {
                let mut record = fill_defaults(element);
                record.specimen_name = resolve_name(specimen_names.get(idx), element);
                record
            })
            .collect();

        if records.is_empty() {
            tracing::debug!("Backend returned an empty specimens list, substituting stub");
            records.push(SpecimenRecord::stub());
        }

        Ok(self.finalize(records, report_text))
    }

    /// The stub record, passed through the same rules as real records.
    pub fn stub_records(&self, report_text: &str) -> Vec<SpecimenRecord> {
        self.finalize(vec![SpecimenRecord::stub()], report_text)
    }

    fn finalize(&self, mut records: Vec<SpecimenRecord>, report_text: &str) -> Vec<SpecimenRecord> {
        let ctx = RuleContext { report_text };
        for record in &mut records {
            for rule in &self.rules {
                if (rule.applies)(record, &ctx) {
                    (rule.apply)(record);
                }
            }
            record.comment = truncate_chars(&record.comment, self.max_comment_length);
        }
        records
    }
}

fn specimen_list(payload: &Value) -> Result<&Vec<Value>, SchemaMismatch> {
    let object = payload
        .as_object()
        .ok_or_else(|| SchemaMismatch::new(format!("expected an object, got {}", json_kind(payload))))?;
    match object.get("specimens") {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(SchemaMismatch::new(format!(
            "'specimens' is {}, expected a list",
            json_kind(other)
        ))),
        None => Err(SchemaMismatch::new("missing 'specimens' key")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Build a record from one list element, filling anything absent.
fn fill_defaults(element: &Value) -> SpecimenRecord {
    let empty = Map::new();
    let fields = element.as_object().unwrap_or_else(|| {
        tracing::debug!(kind = json_kind(element), "Specimen element is not an object");
        &empty
    });

    SpecimenRecord {
        specimen_name: UNKNOWN_SPECIMEN.to_string(),
        gleason_score: text_field(fields, "gleason_score"),
        gleason_pattern: text_field(fields, "gleason_pattern"),
        num_cores: text_field(fields, "num_cores"),
        percent_specimen: text_field(fields, "percent_specimen"),
        features: features_field(fields),
        comment: text_field(fields, "comment"),
    }
}

/// Census name first, then a name the element carries itself.
fn resolve_name(census_name: Option<&String>, element: &Value) -> String {
    census_name
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .or_else(|| {
            element
                .get("specimen_name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
        })
        .unwrap_or(UNKNOWN_SPECIMEN)
        .to_string()
}

/// String field with lenient coercion; absent, null, or blank → `unknown`.
fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Flags nested under `features`, or flat on the element.
fn features_field(fields: &Map<String, Value>) -> SpecimenFeatures {
    let source = match fields.get("features") {
        Some(Value::Object(nested)) => nested,
        _ => fields,
    };

    let mut features = SpecimenFeatures::default();
    for key in SpecimenFeatures::KEYS {
        let value = source
            .get(key)
            .or_else(|| source.get(&key.to_lowercase()));
        features.set(key, flag_value(value));
    }
    features
}

fn flag_value(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v > 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "yes" | "y" | "true" | "present"
        ),
        _ => false,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ── shape validation ───────────────────────────────────────

    #[test]
    fn non_object_payload_is_schema_mismatch() {
        let err = Normalizer::default()
            .normalize(&json!([1, 2]), "report", &[])
            .unwrap_err();
        assert!(err.to_string().contains("expected an object"));
    }

    #[test]
    fn missing_specimens_key_is_schema_mismatch() {
        let err = Normalizer::default()
            .normalize(&json!({"specimen": []}), "report", &[])
            .unwrap_err();
        assert_eq!(err, SchemaMismatch::new("missing 'specimens' key"));
    }

    #[test]
    fn specimens_not_a_list_is_schema_mismatch() {
        let result = Normalizer::default().normalize(&json!({"specimens": "none"}), "report", &[]);
        assert!(result.is_err());
    }

    // ── default filling ────────────────────────────────────────

    #[test]
    fn absent_fields_get_typed_defaults() {
        let records = Normalizer::default()
            .normalize(&json!({"specimens": [{}]}), "adenocarcinoma", &[])
            .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.specimen_name, "Unknown Specimen");
        assert_eq!(record.gleason_score, "unknown");
        assert_eq!(record.gleason_pattern, "unknown");
        assert_eq!(record.num_cores, "unknown");
        assert_eq!(record.percent_specimen, "unknown");
        assert_eq!(record.features, SpecimenFeatures::default());
        assert_eq!(record.comment, "unknown");
    }

    #[test]
    fn values_are_coerced_leniently() {
        let payload = json!({"specimens": [{
            "gleason_score": 7,
            "gleason_pattern": " 3+4 ",
            "num_cores": null,
            "percent_specimen": "",
            "features": {"HGPIN": 1, "ASAP": true, "ATYP": "yes", "INF": "0", "ADC": 0, "pni": 1},
            "comment": "small focus"
        }]});
        let record = &Normalizer::default().normalize(&payload, "carcinoma", &[]).unwrap()[0];
        assert_eq!(record.gleason_score, "7");
        assert_eq!(record.gleason_pattern, "3+4");
        assert_eq!(record.num_cores, "unknown");
        assert_eq!(record.percent_specimen, "unknown");
        assert!(record.features.hgpin);
        assert!(record.features.asap);
        assert!(record.features.atyp);
        assert!(!record.features.inf);
        assert!(!record.features.adc);
        assert!(record.features.pni);
        assert!(!record.features.benign);
        assert_eq!(record.comment, "small focus");
    }

    #[test]
    fn flat_features_are_read() {
        let payload = json!({"specimens": [{"HGPIN": 1, "INF": 1}]});
        let record = &Normalizer::default().normalize(&payload, "", &[]).unwrap()[0];
        assert!(record.features.hgpin);
        assert!(record.features.inf);
        assert!(!record.features.asap);
    }

    #[test]
    fn non_object_element_gets_defaults() {
        let payload = json!({"specimens": ["right base", {"gleason_score": "6"}]});
        let records = Normalizer::default().normalize(&payload, "", &[]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].gleason_score, "unknown");
        assert_eq!(records[1].gleason_score, "6");
    }

    #[test]
    fn empty_list_yields_one_stub() {
        let records = Normalizer::default()
            .normalize(&json!({"specimens": []}), "", &[])
            .unwrap();
        assert_eq!(records, vec![SpecimenRecord::stub()]);
    }

    // ── identity propagation ───────────────────────────────────

    #[test]
    fn census_names_match_positionally() {
        let payload = json!({"specimens": [{}, {}, {}]});
        let records = Normalizer::default()
            .normalize(&payload, "", &names(&["right base", "left apex"]))
            .unwrap();
        assert_eq!(records[0].specimen_name, "right base");
        assert_eq!(records[1].specimen_name, "left apex");
        assert_eq!(records[2].specimen_name, "Unknown Specimen");
    }

    #[test]
    fn element_name_used_when_census_has_none() {
        let payload = json!({"specimens": [{"specimen_name": "left mid prostate biopsy"}]});
        let records = Normalizer::default().normalize(&payload, "", &[]).unwrap();
        assert_eq!(records[0].specimen_name, "left mid prostate biopsy");
    }

    #[test]
    fn blank_census_name_falls_through() {
        let payload = json!({"specimens": [{}]});
        let records = Normalizer::default().normalize(&payload, "", &names(&["  "])).unwrap();
        assert_eq!(records[0].specimen_name, "Unknown Specimen");
    }

    // ── override rules ─────────────────────────────────────────

    #[test]
    fn benign_report_forces_fields_in_any_case() {
        let payload = json!({"specimens": [
            {"gleason_score": "7", "gleason_pattern": "3+4", "comment": "adenocarcinoma", "num_cores": "2/6"},
            {"gleason_score": "9", "gleason_pattern": "4+5", "comment": "high grade"}
        ]});
        for report in ["Benign prostatic tissue", "BENIGN", "mostly bEnIgN glands"] {
            let records = Normalizer::default().normalize(&payload, report, &[]).unwrap();
            for record in &records {
                assert_eq!(record.gleason_score, "benign");
                assert_eq!(record.gleason_pattern, "benign");
                assert_eq!(record.comment, "benign");
            }
            assert_eq!(records[0].num_cores, "2/6");
        }
    }

    #[test]
    fn benign_rule_applies_to_stub() {
        let records = Normalizer::default().stub_records("Benign glands");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gleason_score, "benign");
        assert_eq!(records[0].comment, "benign");
        assert_eq!(records[0].num_cores, "unknown");
    }

    #[test]
    fn stub_without_benign_is_sentinel() {
        assert_eq!(Normalizer::default().stub_records("carcinoma"), vec![SpecimenRecord::stub()]);
    }

    #[test]
    fn score_derived_from_pattern_when_unknown() {
        let payload = json!({"specimens": [
            {"gleason_pattern": "4+3"},
            {"gleason_pattern": "Grade Group 2"},
            {"gleason_score": "8", "gleason_pattern": "3+4"}
        ]});
        let records = Normalizer::default().normalize(&payload, "", &[]).unwrap();
        assert_eq!(records[0].gleason_score, "7");
        assert_eq!(records[1].gleason_score, "unknown");
        assert_eq!(records[2].gleason_score, "8");
    }

    #[test]
    fn pattern_sum_rejects_out_of_range() {
        assert_eq!(pattern_sum("3+4"), Some(7));
        assert_eq!(pattern_sum("5 + 5"), Some(10));
        assert_eq!(pattern_sum("6+4"), None);
        assert_eq!(pattern_sum("0+3"), None);
        assert_eq!(pattern_sum("benign"), None);
    }

    #[test]
    fn custom_rule_runs_after_builtins() {
        let normalizer = Normalizer::default().with_rule(OverrideRule {
            name: "cores_not_available",
            applies: |record, _| record.num_cores == "unknown",
            apply: |record| record.num_cores = "n/a".to_string(),
        });
        let records = normalizer.normalize(&json!({"specimens": [{}]}), "", &[]).unwrap();
        assert_eq!(records[0].num_cores, "n/a");
    }

    // ── length capping ─────────────────────────────────────────

    #[test]
    fn long_comment_is_truncated_to_prefix() {
        let comment = "x".repeat(250);
        let payload = json!({"specimens": [{"comment": comment}]});
        let records = Normalizer::default().normalize(&payload, "", &[]).unwrap();
        assert_eq!(records[0].comment.chars().count(), 200);
        assert!(comment.starts_with(&records[0].comment));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}
