//! Compiler (§4.4): compiles a discovered solution into a runnable
//! artifact, caching per-solution builds for the run lifetime.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::discovery::{Solution, SolutionId, SolutionStatus};
use crate::languages::{LanguageRegistry, RecipeVars};

/// Generous fixed compile timeout (§4.4 step 2).
const COMPILE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub status: BuildStatus,
    pub artifact_path: Option<PathBuf>,
    /// Per-solution scratch subdirectory (§3, §5) the artifact was built
    /// into (or, for interpreted languages, that the runner should use as
    /// its working directory instead of the read-only solution tree).
    pub work_dir: Option<PathBuf>,
    pub compiler_output: Option<String>,
    pub compile_elapsed_ms: u64,
}

impl BuildArtifact {
    fn skipped(reason: &str) -> Self {
        BuildArtifact {
            status: BuildStatus::Skipped,
            artifact_path: None,
            work_dir: None,
            compiler_output: Some(reason.to_string()),
            compile_elapsed_ms: 0,
        }
    }
}

/// Compiles solutions and memoizes the result per solution identity for
/// the lifetime of a grading run. A failed compile propagates to every
/// test run of that solution as `CompilationError` (enforced by `judge`,
/// not here).
pub struct Compiler {
    registry: Arc<LanguageRegistry>,
    scratch_root: PathBuf,
    cache: Mutex<HashMap<SolutionId, Arc<OnceCell<BuildArtifact>>>>,
}

impl Compiler {
    pub fn new(registry: Arc<LanguageRegistry>, scratch_root: PathBuf) -> Self {
        Compiler {
            registry,
            scratch_root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `build(solution, scratch_dir) -> BuildArtifact`, cached by solution
    /// identity so N concurrent callers trigger exactly one compile.
    pub async fn build(&self, solution: &Solution) -> Arc<BuildArtifact> {
        let cell = {
            let mut cache = self.cache.lock().await;
            cache
                .entry(solution.id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let artifact = cell
            .get_or_init(|| async { self.compile_uncached(solution).await })
            .await;

        Arc::new(artifact.clone())
    }

    async fn compile_uncached(&self, solution: &Solution) -> BuildArtifact {
        let language_id = match &solution.status {
            SolutionStatus::Ready { language } => language.clone(),
            SolutionStatus::LanguageAmbiguous => {
                return BuildArtifact::skipped("solution spans more than one language");
            }
            SolutionStatus::LanguageUnknown => {
                return BuildArtifact::skipped("solution language could not be determined");
            }
        };

        let language = match self.registry.get(&language_id) {
            Some(l) => l,
            None => return BuildArtifact::skipped(&format!("unregistered language: {language_id}")),
        };

        let source_dir = solution
            .entry_file
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();

        // Every `Ready` solution gets its own scratch subdirectory, even
        // when interpreted, so the runner never writes into the read-only
        // solution tree under `solutions/<author>/` (§3, §5).
        let work_dir = self
            .scratch_root
            .join(&solution.id.problem)
            .join(&solution.id.author);
        if let Err(e) = std::fs::create_dir_all(&work_dir) {
            warn!("failed to create scratch dir {:?}: {}", work_dir, e);
            return BuildArtifact {
                status: BuildStatus::Failed,
                artifact_path: None,
                work_dir: None,
                compiler_output: Some(format!("failed to create scratch directory: {e}")),
                compile_elapsed_ms: 0,
            };
        }

        let Some(compile_recipe) = &language.compile_recipe else {
            // Interpreted language: the entry file itself is the artifact;
            // only the run's working directory moves into scratch space.
            return BuildArtifact {
                status: BuildStatus::Ok,
                artifact_path: Some(solution.entry_file.clone()),
                work_dir: Some(work_dir),
                compiler_output: None,
                compile_elapsed_ms: 0,
            };
        };

        let artifact_path = work_dir.join(&solution.id.author);

        let vars = RecipeVars {
            source: solution.entry_file.to_string_lossy().to_string(),
            source_dir: source_dir.to_string_lossy().to_string(),
            artifact: artifact_path.to_string_lossy().to_string(),
            artifact_dir: work_dir.to_string_lossy().to_string(),
            ..Default::default()
        };
        let (program, args) = compile_recipe.instantiate(&vars);

        debug!("compiling {:?} with {} {:?}", solution.id, program, args);

        let start = Instant::now();
        let spawn = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawn {
            Ok(c) => c,
            Err(e) => {
                return BuildArtifact {
                    status: BuildStatus::Failed,
                    artifact_path: None,
                    work_dir: Some(work_dir),
                    compiler_output: Some(format!("failed to launch compiler {program}: {e}")),
                    compile_elapsed_ms: start.elapsed().as_millis() as u64,
                };
            }
        };

        let output = tokio::time::timeout(COMPILE_TIMEOUT, child.wait_with_output()).await;
        let compile_elapsed_ms = start.elapsed().as_millis() as u64;

        match output {
            Ok(Ok(output)) => {
                let combined = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                if output.status.success() {
                    info!(
                        "compiled {}/{} in {}ms",
                        solution.id.problem, solution.id.author, compile_elapsed_ms
                    );
                    BuildArtifact {
                        status: BuildStatus::Ok,
                        artifact_path: Some(artifact_path),
                        work_dir: Some(work_dir),
                        compiler_output: if combined.is_empty() { None } else { Some(combined) },
                        compile_elapsed_ms,
                    }
                } else {
                    BuildArtifact {
                        status: BuildStatus::Failed,
                        artifact_path: None,
                        work_dir: Some(work_dir),
                        compiler_output: Some(combined),
                        compile_elapsed_ms,
                    }
                }
            }
            Ok(Err(e)) => BuildArtifact {
                status: BuildStatus::Failed,
                artifact_path: None,
                work_dir: Some(work_dir),
                compiler_output: Some(format!("failed to wait for compiler: {e}")),
                compile_elapsed_ms,
            },
            Err(_) => BuildArtifact {
                status: BuildStatus::Failed,
                artifact_path: None,
                work_dir: Some(work_dir),
                compiler_output: Some("compilation timed out".to_string()),
                compile_elapsed_ms,
            },
        }
    }
}
