use serde::{Serialize, Serializer};

use super::BackendError;

/// Sentinel for any string field the backend did not supply.
pub const UNKNOWN: &str = "unknown";

/// Canonical value forced by the benign-report rule.
pub const BENIGN: &str = "benign";

/// Name given to a specimen the census pass could not name.
pub const UNKNOWN_SPECIMEN: &str = "Unknown Specimen";

/// Comment carried by the stub record.
pub const STUB_COMMENT: &str = "no data";

/// Presence flags reported per specimen. Serialized as 0/1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpecimenFeatures {
    /// High grade prostatic intraepithelial neoplasia.
    #[serde(rename = "HGPIN", serialize_with = "as_flag")]
    pub hgpin: bool,
    /// Atypical small acinar proliferation.
    #[serde(rename = "ASAP", serialize_with = "as_flag")]
    pub asap: bool,
    /// Atypical glands other than ASAP.
    #[serde(rename = "ATYP", serialize_with = "as_flag")]
    pub atyp: bool,
    /// Inflammation or prostatitis.
    #[serde(rename = "INF", serialize_with = "as_flag")]
    pub inf: bool,
    /// Adenocarcinoma described without a Gleason score.
    #[serde(rename = "ADC", serialize_with = "as_flag")]
    pub adc: bool,
    /// Perineural invasion.
    #[serde(rename = "PNI", serialize_with = "as_flag")]
    pub pni: bool,
    #[serde(rename = "Benign", serialize_with = "as_flag")]
    pub benign: bool,
}

fn as_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

impl SpecimenFeatures {
    /// Wire names, in the order the backend is asked for them.
    pub const KEYS: [&'static str; 7] = ["HGPIN", "ASAP", "ATYP", "INF", "ADC", "PNI", "Benign"];

    pub fn set(&mut self, key: &str, value: bool) {
        match key {
            "HGPIN" => self.hgpin = value,
            "ASAP" => self.asap = value,
            "ATYP" => self.atyp = value,
            "INF" => self.inf = value,
            "ADC" => self.adc = value,
            "PNI" => self.pni = value,
            "Benign" => self.benign = value,
            _ => {}
        }
    }
}

/// One tissue specimen described within a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecimenRecord {
    pub specimen_name: String,
    /// 6–10, `benign`, or `unknown`.
    pub gleason_score: String,
    pub gleason_pattern: String,
    /// Cancer-containing cores over total cores, e.g. `3/7`.
    pub num_cores: String,
    pub percent_specimen: String,
    pub features: SpecimenFeatures,
    pub comment: String,
}

impl SpecimenRecord {
    /// Sentinel record substituted when extraction fails.
    pub fn stub() -> Self {
        Self {
            specimen_name: UNKNOWN.to_string(),
            gleason_score: UNKNOWN.to_string(),
            gleason_pattern: UNKNOWN.to_string(),
            num_cores: UNKNOWN.to_string(),
            percent_specimen: UNKNOWN.to_string(),
            features: SpecimenFeatures::default(),
            comment: STUB_COMMENT.to_string(),
        }
    }
}

/// Result of the specimen census pass: how many specimens and what they are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecimenCensus {
    pub count: usize,
    pub names: Vec<String>,
    /// Report excerpt per specimen, when the backend supplied one.
    pub texts: Vec<String>,
}

impl Default for SpecimenCensus {
    fn default() -> Self {
        Self {
            count: 1,
            names: Vec::new(),
            texts: Vec::new(),
        }
    }
}

/// Text-generation backend abstraction (allows mocking).
pub trait LlmClient {
    fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Shared clients, so a caller can keep a handle on a fake it hands to a runner.
impl<T: LlmClient + ?Sized> LlmClient for std::rc::Rc<T> {
    fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        (**self).generate(prompt)
    }
}
