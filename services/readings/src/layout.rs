//! Bucket layout.
//!
//! Sessions live at `[<workType>/]<f|s>_<statusSuffix>/<sessionFolder>/`. The
//! primary work type keeps the historical root layout; every other work type
//! is nested under its code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Review-pipeline stage of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Correct,
    IncorrectNew,
    IncorrectAnalyzed,
    IncorrectLabeled,
    IncorrectTraining,
}

impl Status {
    /// Every status, in scan order
    pub const ALL: [Status; 5] = [
        Status::Correct,
        Status::IncorrectNew,
        Status::IncorrectAnalyzed,
        Status::IncorrectLabeled,
        Status::IncorrectTraining,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Correct => "correct",
            Status::IncorrectNew => "incorrect_new",
            Status::IncorrectAnalyzed => "incorrect_analyzed",
            Status::IncorrectLabeled => "incorrect_labeled",
            Status::IncorrectTraining => "incorrect_training",
        }
    }

    /// Folder suffix in the bucket. `incorrect_new` predates the other
    /// incorrect stages and keeps the bare `incorrect` folder.
    pub fn folder_suffix(&self) -> &'static str {
        match self {
            Status::Correct => "correct",
            Status::IncorrectNew => "incorrect",
            Status::IncorrectAnalyzed => "incorrect_analyzed",
            Status::IncorrectLabeled => "incorrect_labeled",
            Status::IncorrectTraining => "incorrect_training",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a session was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Field,
    Simulator,
}

impl SourceType {
    pub const ALL: [SourceType; 2] = [SourceType::Field, SourceType::Simulator];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Field => "field",
            SourceType::Simulator => "simulator",
        }
    }

    /// Single-character folder tag (`f` / `s`)
    pub fn prefix_char(&self) -> char {
        match self {
            SourceType::Field => 'f',
            SourceType::Simulator => 's',
        }
    }

    /// Human-readable location shown by the dashboard
    pub fn location(&self) -> &'static str {
        match self {
            SourceType::Field => "Field Capture",
            SourceType::Simulator => "Simulator",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source scope of a read request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFilter {
    #[default]
    All,
    Field,
    Simulator,
}

impl SourceFilter {
    /// Sources covered by this filter, field first
    pub fn sources(&self) -> &'static [SourceType] {
        match self {
            SourceFilter::All => &SourceType::ALL,
            SourceFilter::Field => &[SourceType::Field],
            SourceFilter::Simulator => &[SourceType::Simulator],
        }
    }
}

/// Maps (work type, source, status) to bucket prefixes
#[derive(Debug, Clone)]
pub struct Layout {
    primary_work_type: String,
}

impl Layout {
    pub fn new(primary_work_type: impl Into<String>) -> Self {
        Self {
            primary_work_type: primary_work_type.into(),
        }
    }

    pub fn primary_work_type(&self) -> &str {
        &self.primary_work_type
    }

    /// Leading segment for a work type: empty for the primary one
    pub fn work_type_root(&self, work_type: &str) -> String {
        if work_type == self.primary_work_type {
            String::new()
        } else {
            format!("{}/", work_type)
        }
    }

    /// Folder holding every session of one (work type, source, status)
    pub fn status_prefix(&self, work_type: &str, source: SourceType, status: Status) -> String {
        format!(
            "{}{}_{}/",
            self.work_type_root(work_type),
            source.prefix_char(),
            status.folder_suffix()
        )
    }
}

/// Candidate session folders for `session_id` under `status_prefix`, in probe
/// order. Older uploads prefixed the folder with the source tag
/// (`f_<id>/`); that form is only ever read, never written.
pub fn candidate_session_prefixes(
    status_prefix: &str,
    source: SourceType,
    session_id: &str,
) -> [String; 2] {
    [
        format!("{}{}/", status_prefix, session_id),
        format!("{}{}_{}/", status_prefix, source.prefix_char(), session_id),
    ]
}

/// Last folder segment of a session prefix (`f_correct/sess123/` -> `sess123`)
pub fn session_folder_name(session_prefix: &str) -> &str {
    session_prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(session_prefix)
}
