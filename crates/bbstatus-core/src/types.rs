//! Document types persisted by the recorder.
//!
//! One struct per collection. Each document carries its own `_id`;
//! builds reference steps and steps reference their build by id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collection names in the document store.
pub const BUILDERS: &str = "builders";
pub const BUILDS: &str = "builds";
pub const STEPS: &str = "steps";

/// Status given to a builder when it is first added.
pub const STATUS_OFFLINE: &str = "offline";

// ─────────────────────────────────────────────────────────────────────────────
// Host constants
// ─────────────────────────────────────────────────────────────────────────────

/// Result code reported by the host for a finished step or build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success,
    Warnings,
    Failure,
    Skipped,
    Exception,
    Retry,
    Cancelled,
}

impl ResultCode {
    /// Numeric code of a successful result.
    pub const SUCCESS: i32 = 0;

    /// Numeric code as stored in documents.
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::Warnings => 1,
            ResultCode::Failure => 2,
            ResultCode::Skipped => 3,
            ResultCode::Exception => 4,
            ResultCode::Retry => 5,
            ResultCode::Cancelled => 6,
        }
    }

    /// Parse a numeric code. Unknown codes map to `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ResultCode::Success),
            1 => Some(ResultCode::Warnings),
            2 => Some(ResultCode::Failure),
            3 => Some(ResultCode::Skipped),
            4 => Some(ResultCode::Exception),
            5 => Some(ResultCode::Retry),
            6 => Some(ResultCode::Cancelled),
            _ => None,
        }
    }

    /// Label for a stored code, falling back to the raw number.
    pub fn label(code: i32) -> String {
        Self::from_code(code)
            .map(|r| r.to_string())
            .unwrap_or_else(|| format!("result {}", code))
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "success"),
            ResultCode::Warnings => write!(f, "warnings"),
            ResultCode::Failure => write!(f, "failure"),
            ResultCode::Skipped => write!(f, "skipped"),
            ResultCode::Exception => write!(f, "exception"),
            ResultCode::Retry => write!(f, "retry"),
            ResultCode::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Log stream a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stdout,
    Stderr,
    Header,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Stdout, Channel::Stderr, Channel::Header];

    /// Host channel number (stdout=0, stderr=1, header=2).
    pub fn code(self) -> u8 {
        match self {
            Channel::Stdout => 0,
            Channel::Stderr => 1,
            Channel::Header => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Channel::Stdout),
            1 => Some(Channel::Stderr),
            2 => Some(Channel::Header),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stdout => write!(f, "stdout"),
            Channel::Stderr => write!(f, "stderr"),
            Channel::Header => write!(f, "header"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

/// A document in the `builders` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub master_id: Option<String>,
    pub status: String,
}

impl BuilderRecord {
    pub fn new(name: impl Into<String>, master_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            master_id,
            status: STATUS_OFFLINE.to_string(),
        }
    }
}

/// A document in the `builds` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub builder: String,
    pub workers: Vec<String>,
    pub number: u64,
    pub time_start: DateTime<Utc>,
    pub time_end: Option<DateTime<Utc>>,
    /// Step ids in the order the steps started
    pub steps: Vec<String>,
    pub successful: bool,
    pub result: Option<i32>,
}

impl BuildRecord {
    pub fn new(
        builder: impl Into<String>,
        workers: Vec<String>,
        number: u64,
        time_start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            builder: builder.into(),
            workers,
            number,
            time_start,
            time_end: None,
            steps: Vec::new(),
            successful: true,
            result: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.time_end.is_some()
    }
}

/// A document in the `steps` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(rename = "_id")]
    pub id: String,
    /// Id of the owning build document
    pub build: String,
    pub name: String,
    pub time_start: DateTime<Utc>,
    pub time_end: Option<DateTime<Utc>>,
    pub stdout: String,
    pub stderr: String,
    pub headers: String,
    pub successful: bool,
    pub result: Option<i32>,
    #[serde(default)]
    pub text: Vec<String>,
}

impl StepRecord {
    pub fn new(build: impl Into<String>, name: impl Into<String>, time_start: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            build: build.into(),
            name: name.into(),
            time_start,
            time_end: None,
            stdout: String::new(),
            stderr: String::new(),
            headers: String::new(),
            successful: false,
            result: None,
            text: Vec::new(),
        }
    }

    /// Buffer holding text for `channel`.
    pub fn buffer(&self, channel: Channel) -> &str {
        match channel {
            Channel::Stdout => &self.stdout,
            Channel::Stderr => &self.stderr,
            Channel::Header => &self.headers,
        }
    }

    pub fn buffer_mut(&mut self, channel: Channel) -> &mut String {
        match channel {
            Channel::Stdout => &mut self.stdout,
            Channel::Stderr => &mut self.stderr,
            Channel::Header => &mut self.headers,
        }
    }
}

/// Filter for build listings.
#[derive(Debug, Clone, Default)]
pub struct BuildQuery {
    /// Only builds of this builder
    pub builder: Option<String>,
    /// Only builds that ran on this worker
    pub worker: Option<String>,
    /// Only finished (`Some(true)`) or running (`Some(false)`) builds
    pub finished: Option<bool>,
    /// Maximum number of results, newest first
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_numbers() {
        assert_eq!(ResultCode::Success.code(), ResultCode::SUCCESS);
        for code in 0..7 {
            let result = ResultCode::from_code(code).unwrap();
            assert_eq!(result.code(), code);
        }
        assert!(ResultCode::from_code(42).is_none());
        assert_eq!(ResultCode::label(2), "failure");
        assert_eq!(ResultCode::label(42), "result 42");
    }

    #[test]
    fn test_channel_codes() {
        assert_eq!(Channel::from_code(0), Some(Channel::Stdout));
        assert_eq!(Channel::from_code(1), Some(Channel::Stderr));
        assert_eq!(Channel::from_code(2), Some(Channel::Header));
        assert_eq!(Channel::from_code(3), None);
    }

    #[test]
    fn test_new_build_is_open_and_successful() {
        let build = BuildRecord::new("linux-x64", vec!["w1".into()], 42, Utc::now());
        assert!(!build.is_finished());
        assert!(build.successful);
        assert!(build.steps.is_empty());
        assert!(build.result.is_none());
    }

    #[test]
    fn test_step_buffers_by_channel() {
        let mut step = StepRecord::new("build-1", "compile", Utc::now());
        step.buffer_mut(Channel::Stdout).push_str("out");
        step.buffer_mut(Channel::Stderr).push_str("err");
        step.buffer_mut(Channel::Header).push_str("hdr");

        assert_eq!(step.stdout, "out");
        assert_eq!(step.stderr, "err");
        assert_eq!(step.headers, "hdr");
        assert_eq!(step.buffer(Channel::Header), "hdr");
        assert!(!step.successful);
    }

    #[test]
    fn test_documents_use_mongo_id_field() {
        let builder = BuilderRecord::new("linux-x64", None);
        let json = serde_json::to_value(&builder).unwrap();
        assert_eq!(json["_id"], builder.id.as_str());
        assert_eq!(json["status"], "offline");
        assert!(json["master_id"].is_null());

        let step = StepRecord::new("build-1", "compile", Utc::now());
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["build"], "build-1");
        assert!(json["time_end"].is_null());
    }
}
