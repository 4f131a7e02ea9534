//! Harness-level error taxonomy.
//!
//! Per §7 of the design, errors below the dispatcher are contained at
//! pair granularity and surface as data (`BuildArtifact::status`,
//! `RunOutcome::exit_kind`, `GradeResult`). Only failures that prevent a
//! grading run from starting at all reach here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("problem root does not exist: {0}")]
    ProblemRootMissing(PathBuf),

    #[error("problem root is not a directory: {0}")]
    ProblemRootNotADirectory(PathBuf),

    #[error("config file unreadable: {path}")]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file malformed: {path}")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("language registry misconfigured: {0}")]
    RegistryMisconfigured(String),
}
