use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Languages the executor knows how to stage and run.
///
/// The set is closed: adding a language means adding a variant here and a
/// default toolchain for it in the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Python,
    Java,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Cpp, Language::Python, Language::Java];

    /// Parse a wire name, accepting the short aliases clients send.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpp" | "c++" | "c" => Some(Language::Cpp),
            "python" | "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python => "python",
            Language::Java => "java",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// Read-only view of a question: only the fields the judge consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Verdict state machine. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Pending,
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Compilation Error")]
    CompilationError,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    Error,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "Pending",
            SubmissionStatus::Accepted => "Accepted",
            SubmissionStatus::WrongAnswer => "Wrong Answer",
            SubmissionStatus::CompilationError => "Compilation Error",
            SubmissionStatus::RuntimeError => "Runtime Error",
            SubmissionStatus::Error => "Error",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub user_id: String,
    pub question_id: String,
    /// Kept as sent by the client; the executor decides whether it is supported.
    pub language: String,
    pub code: String,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub output: String,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn new_pending(user_id: String, question_id: String, language: String, code: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            question_id,
            language,
            code,
            status: SubmissionStatus::Pending,
            output: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Terminal outcome written back to a submission exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: SubmissionStatus,
    pub output: String,
}

/// Queue payload handed from the API to the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeJob {
    pub submission_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

impl JudgeJob {
    pub fn new(submission_id: Uuid) -> Self {
        Self {
            submission_id,
            enqueued_at: Utc::now(),
        }
    }
}

fn default_language() -> String {
    "cpp".to_string()
}

/// `null` reads the same as an absent field
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_language<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_language))
}

/// Body of `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default = "default_language", deserialize_with = "null_as_default_language")]
    pub language: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub input: String,
}

/// Why a run failed, when a language runner classified it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Compile,
    Runtime,
    Timeout,
}

/// Response of `POST /run`: all-or-nothing, never partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl RunResponse {
    pub fn ok(output: String) -> Self {
        Self {
            success: true,
            output,
            error_kind: None,
        }
    }

    pub fn failed(output: String, error_kind: Option<FailureKind>) -> Self {
        Self {
            success: false,
            output,
            error_kind,
        }
    }

    pub fn unsupported_language(language: &str) -> Self {
        Self::failed(format!("Unsupported language: {}", language), None)
    }
}
