use crate::layout::{SourceType, Status};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One inspection session as served to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session identifier, unique within the bucket
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub source_type: SourceType,
    pub location: &'static str,
    pub work_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_type_name: Option<&'static str>,
    /// Status of the folder the session currently sits in
    pub status: Status,
    pub predicted_value: Option<String>,
    pub raw_prediction: Option<String>,
    pub user_correction: Option<String>,
    pub is_correct: Option<bool>,
    pub processing_time_ms: Option<f64>,
    /// Model confidence, 0-1
    pub confidence: f64,
    pub dial_count: u32,
    pub per_dial_details: Vec<DialDetail>,
    pub condition_code: Option<String>,
    /// Overview first, then dials
    pub images: Vec<ImageReference>,
}

/// One image file within a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    /// Full object key
    pub object_key: String,
    /// Time-limited signed URL
    pub access_url: String,
    pub label: String,
    pub file_name: String,
    pub byte_size: u64,
    /// Nominal resolution tag, not measured from the image
    pub resolution: &'static str,
    /// Zero-based dial position, per-dial images only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial_index: Option<u32>,
}

/// Per-dial prediction detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialDetail {
    #[serde(default, alias = "dial_index")]
    pub dial_index: Option<u32>,
    #[serde(
        default,
        alias = "predicted_digit",
        deserialize_with = "lenient::string_or_number"
    )]
    pub predicted_digit: Option<String>,
    #[serde(default, alias = "rotation_direction")]
    pub rotation_direction: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// `metadata.json` written next to the images of every session
#[derive(Debug, Clone, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub session_id: Option<String>,
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::string_or_number")]
    pub ml_prediction: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_or_number")]
    pub ml_raw_prediction: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_or_number")]
    pub user_correction: Option<String>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub processing_time_ms: Option<f64>,
    #[serde(default)]
    pub dial_count: Option<u32>,
    #[serde(default)]
    pub dial_details: Option<Vec<DialDetail>>,
    #[serde(default)]
    pub work_type: Option<String>,
    #[serde(default)]
    pub condition_code: Option<String>,
}

/// Parse a capture timestamp. Offset-less values are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Totals per status over one scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingCounts {
    pub total_readings: usize,
    /// Images across all sessions in scope
    pub total_pictures: usize,
    pub correct_count: usize,
    pub incorrect_new_count: usize,
    pub incorrect_analyzed_count: usize,
    pub incorrect_labeled_count: usize,
    pub incorrect_training_count: usize,
}

impl ReadingCounts {
    pub fn from_records(records: &[SessionRecord]) -> Self {
        records.iter().fold(Self::default(), |mut counts, record| {
            counts.total_readings += 1;
            counts.total_pictures += record.images.len();
            match record.status {
                Status::Correct => counts.correct_count += 1,
                Status::IncorrectNew => counts.incorrect_new_count += 1,
                Status::IncorrectAnalyzed => counts.incorrect_analyzed_count += 1,
                Status::IncorrectLabeled => counts.incorrect_labeled_count += 1,
                Status::IncorrectTraining => counts.incorrect_training_count += 1,
            }
            counts
        })
    }
}

/// Sessions per review status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub correct: usize,
    pub incorrect_new: usize,
    pub incorrect_analyzed: usize,
    pub incorrect_labeled: usize,
    pub incorrect_training: usize,
}

impl StatusBreakdown {
    fn record(&mut self, status: Status) {
        match status {
            Status::Correct => self.correct += 1,
            Status::IncorrectNew => self.incorrect_new += 1,
            Status::IncorrectAnalyzed => self.incorrect_analyzed += 1,
            Status::IncorrectLabeled => self.incorrect_labeled += 1,
            Status::IncorrectTraining => self.incorrect_training += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionCodeCount {
    pub code: String,
    pub count: usize,
}

/// Summary of one work type's sessions across both sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkTypeStats {
    pub work_type_code: String,
    pub work_type_name: String,
    pub total_readings: usize,
    pub total_pictures: usize,
    pub status_breakdown: StatusBreakdown,
    /// Most frequent first, ties by code
    pub condition_code_counts: Vec<ConditionCodeCount>,
    /// Keyed by the inspector's verdict: `correct`, `incorrect` or `unknown`
    pub feedback_breakdown: BTreeMap<&'static str, usize>,
}

impl WorkTypeStats {
    pub fn from_records(code: &str, name: &str, records: &[SessionRecord]) -> Self {
        let mut status_breakdown = StatusBreakdown::default();
        let mut feedback_breakdown = BTreeMap::new();
        let mut conditions: HashMap<&str, usize> = HashMap::new();
        let mut total_pictures = 0;

        for record in records {
            status_breakdown.record(record.status);
            total_pictures += record.images.len();

            let verdict = match record.is_correct {
                Some(true) => "correct",
                Some(false) => "incorrect",
                None => "unknown",
            };
            *feedback_breakdown.entry(verdict).or_insert(0) += 1;

            if let Some(condition) = record.condition_code.as_deref().filter(|c| !c.is_empty()) {
                *conditions.entry(condition).or_insert(0) += 1;
            }
        }

        let mut condition_code_counts: Vec<ConditionCodeCount> = conditions
            .into_iter()
            .map(|(code, count)| ConditionCodeCount {
                code: code.to_string(),
                count,
            })
            .collect();
        condition_code_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));

        Self {
            work_type_code: code.to_string(),
            work_type_name: name.to_string(),
            total_readings: records.len(),
            total_pictures,
            status_breakdown,
            condition_code_counts,
            feedback_breakdown,
        }
    }
}

/// Metadata documents are written by several app versions; predictions show
/// up both as strings and as bare numbers.
mod lenient {
    use serde::{de, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(de::Error::custom(format!(
                "expected string or number, got {}",
                other
            ))),
        }
    }
}
