//! Hammurabi grading core: discovers a problem tree, compiles and runs
//! each solution against each test case, verifies output, and aggregates
//! typed results. Configuration loading, the CLI, and report rendering
//! are external collaborators layered on top of this crate.

pub mod compiler;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod judge;
pub mod languages;
pub mod reference;
pub mod result;
pub mod runner;
pub mod verifier;

pub use compiler::{BuildArtifact, BuildStatus, Compiler};
pub use config::EffectiveConfig;
pub use discovery::{discover, DiscoveryMode, Inventory, Problem, Solution, Testcase};
pub use dispatcher::{dispatch, DispatchOptions, DispatchedRun, PairFilter};
pub use error::HarnessError;
pub use judge::{judge, TestRun};
pub use languages::LanguageRegistry;
pub use reference::{generate_answers, GenerateOutcome};
pub use result::GradeResult;
pub use runner::{RunLimits, RunOutcome, Runner, SubprocessRunner};
pub use verifier::{Verifier, VerifierRegistry, VerifierVerdict};
