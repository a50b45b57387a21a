//! Stage results: the append-only audit trail carried by every task

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Timestamp format used throughout the task envelope
pub fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// One worker's recorded outcome for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub timestamp: String,

    #[serde(flatten)]
    pub stage: Stage,
}

impl StageResult {
    pub fn new(stage: Stage) -> Self {
        Self {
            timestamp: timestamp_now(),
            stage,
        }
    }

    /// The `type` tag this entry serializes with
    pub fn type_name(&self) -> &'static str {
        match self.stage {
            Stage::FetchResult(_) => "fetch-result",
            Stage::ParseResult(_) => "parse-result",
            Stage::Error { .. } => "error",
            Stage::DepthLimited { .. } => "depth-limited",
            Stage::Duplicate { .. } => "duplicate",
        }
    }
}

/// Type-specific payload of a stage result, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Stage {
    FetchResult(FetchRecord),
    ParseResult(ParseRecord),
    Error { error: String, kind: String },
    DepthLimited { status: String },
    Duplicate { owner: String },
}

/// What the spider learned from one GET
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub method: String,
    pub code: u16,
    /// Elapsed seconds
    pub time: f64,
    /// Blob reference of the raw body
    pub local: String,
    /// Depth that children of this page will be created at
    pub depth: u32,
    /// URL the body was served from after redirects; links resolve against it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// What the scanner extracted from one page
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParseRecord {
    pub title: Option<String>,
    pub links: Vec<LinkSummary>,
    pub text: Vec<String>,
    /// Identifiers of the fetch tasks created from this page
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub href: String,
    pub text: String,
}
