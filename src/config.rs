//! Effective configuration consumed by the core (§6).
//!
//! Loading and merging the top-level config file with per-problem
//! overrides is the job of an external collaborator; this module only
//! defines the typed shape the core reads from and a minimal loader
//! sufficient to drive the pipeline without a CLI front-end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::HarnessError;

/// Top-level, problem-independent defaults (§6). Per-problem overrides
/// (`ProblemOverride`) are merged onto an individual `Problem`, not onto
/// this type — see `discovery::build_problem`.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub locations: Locations,
    pub security: Security,
    pub runner: RunnerSelector,
    pub limits: Limits,
    pub reporting: Reporting,
}

#[derive(Debug, Clone)]
pub struct Locations {
    pub problem_root: PathBuf,
    pub report_root: PathBuf,
    /// Template over `{dt}` and `{hostname}`.
    pub report_folder_template: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Security {
    pub report_stdout: bool,
    pub report_stderr: bool,
}

#[derive(Debug, Clone)]
pub struct RunnerSelector {
    pub name: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Limits {
    /// MB.
    pub memory: u32,
    pub time_limit_multiplier: f64,
    /// Seconds, by language id.
    pub time: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Reporting {
    pub alert_banner: Option<String>,
    pub warning_banner: Option<String>,
    pub info_banner: Option<String>,
}

/// Per-problem overrides (`problem.<ext>` in the layout of §6).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProblemOverride {
    pub verifier: Option<String>,
    pub problem_input_file: Option<String>,
    pub problem_output_file: Option<String>,
    pub testcase_score: HashMap<String, i32>,
    pub limits: ProblemLimitsOverride,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProblemLimitsOverride {
    pub time: HashMap<String, f64>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        EffectiveConfig {
            locations: Locations {
                problem_root: PathBuf::from("."),
                report_root: PathBuf::from("./report"),
                report_folder_template: "{dt}-{hostname}".to_string(),
            },
            security: Security {
                report_stdout: true,
                report_stderr: true,
            },
            runner: RunnerSelector {
                name: "subprocess".to_string(),
                params: HashMap::new(),
            },
            limits: Limits {
                memory: 256,
                time_limit_multiplier: 1.0,
                time: HashMap::new(),
            },
            reporting: Reporting::default(),
        }
    }
}

/// Raw on-disk representation, deserialized directly from TOML.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    locations: RawLocations,
    #[serde(default)]
    security: RawSecurity,
    #[serde(default)]
    runner: RawRunner,
    #[serde(default)]
    limits: RawLimits,
    #[serde(default)]
    reporting: Reporting2,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawLocations {
    problem_root: PathBuf,
    report_root: PathBuf,
    report_folder_template: String,
}

impl Default for RawLocations {
    fn default() -> Self {
        let d = EffectiveConfig::default().locations;
        RawLocations {
            problem_root: d.problem_root,
            report_root: d.report_root,
            report_folder_template: d.report_folder_template,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSecurity {
    report_stdout: bool,
    report_stderr: bool,
}

impl Default for RawSecurity {
    fn default() -> Self {
        RawSecurity {
            report_stdout: true,
            report_stderr: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRunner {
    name: Option<String>,
    params: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawLimits {
    memory: u32,
    time_limit_multiplier: f64,
    time: HashMap<String, f64>,
}

impl Default for RawLimits {
    fn default() -> Self {
        RawLimits {
            memory: 256,
            time_limit_multiplier: 1.0,
            time: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename = "reporting")]
struct Reporting2 {
    alert_banner: Option<String>,
    warning_banner: Option<String>,
    info_banner: Option<String>,
}

/// Load and materialize the top-level config file.
///
/// Returns defaults (with `problem_root` overridden) if `path` does not
/// exist at all, since an un-configured run against a bare problem tree is
/// a valid boundary case (§8), not a harness failure.
pub fn load(path: &Path, problem_root: &Path) -> Result<EffectiveConfig, HarnessError> {
    if !path.exists() {
        let mut cfg = EffectiveConfig::default();
        cfg.locations.problem_root = problem_root.to_path_buf();
        return Ok(cfg);
    }

    let content = std::fs::read_to_string(path).map_err(|source| HarnessError::ConfigUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: RawConfig = toml::from_str(&content).map_err(|source| HarnessError::ConfigMalformed {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(EffectiveConfig {
        locations: Locations {
            problem_root: problem_root.to_path_buf(),
            report_root: raw.locations.report_root,
            report_folder_template: raw.locations.report_folder_template,
        },
        security: Security {
            report_stdout: raw.security.report_stdout,
            report_stderr: raw.security.report_stderr,
        },
        runner: RunnerSelector {
            name: raw.runner.name.unwrap_or_else(|| "subprocess".to_string()),
            params: raw.runner.params,
        },
        limits: Limits {
            memory: raw.limits.memory,
            time_limit_multiplier: raw.limits.time_limit_multiplier,
            time: raw.limits.time,
        },
        reporting: Reporting {
            alert_banner: raw.reporting.alert_banner,
            warning_banner: raw.reporting.warning_banner,
            info_banner: raw.reporting.info_banner,
        },
    })
}

/// Parse a `problem.<ext>` override file if present next to `testcases/`.
pub fn load_problem_override(path: &Path) -> Option<ProblemOverride> {
    let content = std::fs::read_to_string(path).ok()?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content).ok(),
        Some("json") => serde_json::from_str(&content).ok(),
        _ => None,
    }
}
