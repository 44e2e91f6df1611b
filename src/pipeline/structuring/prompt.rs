use super::types::SpecimenCensus;

/// Build the census prompt: how many specimens and what they are called.
pub fn build_census_prompt(report_text: &str) -> String {
    format!(
        r#"You are extracting clinical data from a pathology report.
Count the biopsy specimens in the report and list their names. Names may contain
the words right, left, base, apex, mid, prostate, and biopsy, and may appear as a
numbered or lettered list. A name ends at a colon. Remove commas from names and
order the words as side, then position, then "prostate biopsy"
(e.g. "right base prostate biopsy"). "right, left prostate biopsy" means two
separate specimens. Copy the report text describing each specimen.
Do not infer anything that is not written. Respond ONLY with a JSON object:

{{
  "number_of_specimens": <integer>,
  "specimen_names": ["name", "name"],
  "specimen_text": ["text", "text"]
}}

<report>
{report_text}
</report>
"#
    )
}

/// Build the per-subject extraction prompt from the census result.
///
/// Named specimens are listed with their report excerpt, when the census
/// supplied one, so the backend keeps them apart and in order.
pub fn build_specimen_prompt(report_text: &str, census: &SpecimenCensus) -> String {
    let specimen_count = census.count;
    let guide = specimen_guide(census);
    format!(
        r#"You are extracting clinical data from a pathology report. Use only data written
for each specimen and do not infer values.

<report>
{report_text}
</report>
{guide}
Extract the following for each of the {specimen_count} specimens, in report order:
- "gleason_score": number from 6 to 10. If missing but a pattern is given, sum the
  two patterns. "benign" if the specimen is benign, "unknown" if not found.
- "gleason_pattern": two numbers 1-5 joined by "+", or a grade group 1-5.
  "benign" if benign, "unknown" if not found.
- "num_cores": cancer-containing cores over total cores, e.g. "3/7", or "unknown".
- "percent_specimen": cancer percentage such as "<5%", a range if a range is
  given, or "unknown".
- "features": 0 (absent) or 1 (present) for
  HGPIN (high grade prostatic intraepithelial neoplasia),
  ASAP (atypical small acinar proliferation),
  ATYP (atypical glands other than ASAP),
  INF (inflammation or prostatitis),
  ADC (adenocarcinoma without a Gleason score),
  PNI (perineural invasion),
  Benign (benign tissue).
- "comment": the text after the specimen name up to the first period, or "none".

Respond ONLY with a valid JSON object in this format:

{{
  "specimens": [
    {{
      "gleason_score": "",
      "gleason_pattern": "",
      "num_cores": "",
      "percent_specimen": "",
      "features": {{"HGPIN": 0, "ASAP": 0, "ATYP": 0, "INF": 0, "ADC": 0, "PNI": 0, "Benign": 0}},
      "comment": ""
    }}
  ]
}}
"#
    )
}

/// Numbered `name: excerpt` lines, or nothing when the census named no specimens.
fn specimen_guide(census: &SpecimenCensus) -> String {
    if census.names.is_empty() {
        return String::new();
    }
    let mut guide = String::from("\nSpecimens identified in the report, in order:\n");
    for (idx, name) in census.names.iter().enumerate() {
        match census.texts.get(idx).map(|t| t.trim()).filter(|t| !t.is_empty()) {
            Some(text) => guide.push_str(&format!("{}. {name}: {text}\n", idx + 1)),
            None => guide.push_str(&format!("{}. {name}\n", idx + 1)),
        }
    }
    guide
}
