//! Result model (§3, §6): the closed set of outcomes a `TestRun` can
//! reach, and the stable status codes the report renderer depends on.

use serde::Serialize;

/// Tagged outcome of one `(solution, testcase)` pair. Named `GradeResult`
/// to avoid colliding with `std::result::Result`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status_code")]
pub enum GradeResult {
    #[serde(rename = "CE")]
    CompilationError { compiler_output: Option<String> },
    #[serde(rename = "RE")]
    RuntimeError {
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "WA")]
    WrongAnswer { detail: Option<String> },
    #[serde(rename = "OF")]
    OutputFormatError { detail: Option<String> },
    #[serde(rename = "IE")]
    InternalError { detail: String },
    #[serde(rename = "MA")]
    MissingAnswer,
    #[serde(rename = "SKIP")]
    Skipped { reason: String },
    #[serde(rename = "OK")]
    CorrectAnswer { score: i32 },
}

impl GradeResult {
    /// Stable, report-visible status code (§6). Must not change value
    /// silently once assigned.
    pub fn status_code(&self) -> &'static str {
        match self {
            GradeResult::CompilationError { .. } => "CE",
            GradeResult::RuntimeError { .. } => "RE",
            GradeResult::TimeLimitExceeded => "TLE",
            GradeResult::WrongAnswer { .. } => "WA",
            GradeResult::OutputFormatError { .. } => "OF",
            GradeResult::InternalError { .. } => "IE",
            GradeResult::MissingAnswer => "MA",
            GradeResult::Skipped { .. } => "SKIP",
            GradeResult::CorrectAnswer { .. } => "OK",
        }
    }

    /// `CorrectAnswer.score = testcase.score`; every other variant scores 0.
    pub fn score(&self) -> i32 {
        match self {
            GradeResult::CorrectAnswer { score } => *score,
            _ => 0,
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, GradeResult::CorrectAnswer { .. })
    }
}
