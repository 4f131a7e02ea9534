//! Judge (§4.6): composes Compiler → Runner → Verifier for one
//! `(solution, testcase)` pair into a typed [`TestRun`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::compiler::{BuildArtifact, BuildStatus, Compiler};
use crate::config::EffectiveConfig;
use crate::discovery::{Problem, Solution, Testcase};
use crate::result::GradeResult;
use crate::runner::{ExitKind, RunLimits, RunOutcome, Runner, SubprocessRunner};
use crate::verifier::VerifierRegistry;

/// Full record of grading one solution against one testcase (§3).
#[derive(Debug, Clone)]
pub struct TestRun {
    pub solution_problem: String,
    pub solution_author: String,
    pub testcase_name: String,
    /// Milliseconds since the Unix epoch; brackets build (on cache miss)
    /// and run for this pair.
    pub judge_start_time_ms: u128,
    pub judge_end_time_ms: u128,
    pub build: Arc<BuildArtifact>,
    pub run_outcome: Option<RunOutcome>,
    pub result: GradeResult,
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Grades one `(solution, testcase)` pair, applying the eight composition
/// rules of §4.6 in order; the first match wins.
pub async fn judge(
    solution: &Solution,
    problem: &Problem,
    testcase: &Testcase,
    config: &EffectiveConfig,
    compiler: &Compiler,
    runner: &dyn Runner,
    verifiers: &VerifierRegistry,
) -> TestRun {
    let judge_start_time_ms = now_ms();

    let Some(expected_answer_path) = &testcase.expected_answer_path else {
        let build = Arc::new(BuildArtifact {
            status: BuildStatus::Skipped,
            artifact_path: None,
            work_dir: None,
            compiler_output: None,
            compile_elapsed_ms: 0,
        });
        return TestRun {
            solution_problem: solution.problem().to_string(),
            solution_author: solution.author().to_string(),
            testcase_name: testcase.name.clone(),
            judge_start_time_ms,
            judge_end_time_ms: now_ms(),
            build,
            run_outcome: None,
            result: GradeResult::MissingAnswer,
        };
    };

    let build = compiler.build(solution).await;

    // Rule 1: a failed or skipped compile never reaches the runner.
    if build.status != BuildStatus::Ok {
        let result = match build.status {
            BuildStatus::Failed => GradeResult::CompilationError {
                compiler_output: build.compiler_output.clone(),
            },
            BuildStatus::Skipped => GradeResult::Skipped {
                reason: build
                    .compiler_output
                    .clone()
                    .unwrap_or_else(|| "solution not compiled".to_string()),
            },
            BuildStatus::Ok => unreachable!(),
        };
        return TestRun {
            solution_problem: solution.problem().to_string(),
            solution_author: solution.author().to_string(),
            testcase_name: testcase.name.clone(),
            judge_start_time_ms,
            judge_end_time_ms: now_ms(),
            build,
            run_outcome: None,
            result,
        };
    }

    let language_id = match &solution.status {
        crate::discovery::SolutionStatus::Ready { language } => language.clone(),
        _ => unreachable!("Ok build implies a resolved language"),
    };

    let time_limit_secs = problem
        .time_limit_overrides
        .get(&language_id)
        .copied()
        .unwrap_or_else(|| default_time_limit_secs(&language_id));
    let time_limit_ms =
        (time_limit_secs * config.limits.time_limit_multiplier * 1000.0).round() as u64;

    let limits = RunLimits {
        time_limit_ms,
        memory_limit_mb: config.limits.memory,
    };

    let artifact_path = build.artifact_path.clone().unwrap_or_default();
    // Always the per-solution scratch subdirectory the compiler created
    // (§3, §5), even for interpreted languages whose artifact_path points
    // at the read-only entry file under solutions/<author>/.
    let work_dir = build.work_dir.clone().unwrap_or_default();
    let output_path = scratch_output_path(&work_dir, &testcase.name);

    let run_outcome = runner
        .run(
            &language_for(&language_id),
            &artifact_path,
            &work_dir,
            &testcase.input_path,
            &output_path,
            &limits,
        )
        .await;

    let result = classify_run(&run_outcome, &output_path, expected_answer_path, &problem.verifier_name, testcase, verifiers);

    TestRun {
        solution_problem: solution.problem().to_string(),
        solution_author: solution.author().to_string(),
        testcase_name: testcase.name.clone(),
        judge_start_time_ms,
        judge_end_time_ms: now_ms(),
        build,
        run_outcome: Some(run_outcome),
        result,
    }
}

fn classify_run(
    run_outcome: &RunOutcome,
    output_path: &std::path::Path,
    expected_answer_path: &PathBuf,
    verifier_name: &str,
    testcase: &Testcase,
    verifiers: &VerifierRegistry,
) -> GradeResult {
    // Rules 2-5: runner-reported non-completion short-circuits verification.
    match &run_outcome.exit_kind {
        ExitKind::LaunchError(detail) => {
            return GradeResult::InternalError {
                detail: format!("launch failure: {detail}"),
            };
        }
        ExitKind::Timeout => return GradeResult::TimeLimitExceeded,
        ExitKind::Signaled(signal) => {
            return GradeResult::RuntimeError {
                exit_code: None,
                signal: Some(*signal),
            };
        }
        ExitKind::Normal(code) if *code != 0 => {
            return GradeResult::RuntimeError {
                exit_code: Some(*code),
                signal: None,
            };
        }
        ExitKind::Normal(_) => {}
    }

    // Rule 6: output file missing or unreadable.
    if !output_path.is_file() {
        return GradeResult::OutputFormatError {
            detail: Some("no output".to_string()),
        };
    }

    let Some(verifier) = verifiers.get(verifier_name) else {
        return GradeResult::InternalError {
            detail: format!("unknown verifier: {verifier_name}"),
        };
    };

    // Rule 7-8: delegate to the verifier.
    match verifier.verify(expected_answer_path, output_path) {
        Ok(verdict) if verdict.correct => GradeResult::CorrectAnswer {
            score: testcase.score,
        },
        Ok(verdict) if verdict.format_error => GradeResult::OutputFormatError {
            detail: verdict.detail,
        },
        Ok(verdict) => GradeResult::WrongAnswer {
            detail: verdict.detail,
        },
        Err(e) => {
            warn!("verifier {} raised an error: {}", verifier_name, e);
            GradeResult::InternalError {
                detail: format!("verifier error: {e}"),
            }
        }
    }
}

fn scratch_output_path(work_dir: &std::path::Path, testcase_name: &str) -> PathBuf {
    work_dir.join(format!("{testcase_name}.actual"))
}

/// Re-resolves a language by id against the builtin registry. The judge
/// only ever sees languages already validated by discovery/compiler.
fn language_for(language_id: &str) -> crate::languages::Language {
    crate::languages::LanguageRegistry::builtin()
        .get(language_id)
        .cloned()
        .expect("language_id originates from a successful classification")
}

fn default_time_limit_secs(language_id: &str) -> f64 {
    crate::languages::LanguageRegistry::builtin()
        .get(language_id)
        .map(|l| l.default_time_limit_secs)
        .unwrap_or(2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{SolutionId, SolutionStatus};
    use std::sync::Arc as StdArc;

    fn sample_problem(name: &str) -> Problem {
        Problem {
            name: name.to_string(),
            root_path: PathBuf::new(),
            input_filename: "input.txt".to_string(),
            output_filename: "output.txt".to_string(),
            verifier_name: "exact_bytes".to_string(),
            testcase_scores: Default::default(),
            time_limit_overrides: Default::default(),
        }
    }

    fn sample_testcase(problem: &str, expected: Option<PathBuf>) -> Testcase {
        Testcase {
            problem: problem.to_string(),
            name: "01".to_string(),
            input_path: PathBuf::from("/dev/null"),
            expected_answer_path: expected,
            score: 1,
        }
    }

    fn sample_solution(problem: &str, author: &str) -> Solution {
        Solution {
            id: SolutionId {
                problem: problem.to_string(),
                author: author.to_string(),
            },
            source_files: vec![],
            entry_file: PathBuf::new(),
            status: SolutionStatus::Ready {
                language: "python".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn missing_answer_short_circuits_before_build() {
        let problem = sample_problem("hworld");
        let testcase = sample_testcase("hworld", None);
        let solution = sample_solution("hworld", "alice");
        let config = EffectiveConfig::default();

        let dir = tempfile::tempdir().unwrap();
        let registry = StdArc::new(crate::languages::LanguageRegistry::builtin());
        let compiler = Compiler::new(registry, dir.path().to_path_buf());
        let runner = SubprocessRunner::new();
        let verifiers = VerifierRegistry::builtin();

        let run = judge(&solution, &problem, &testcase, &config, &compiler, &runner, &verifiers).await;
        assert!(matches!(run.result, GradeResult::MissingAnswer));
        assert!(run.run_outcome.is_none());
    }

    #[tokio::test]
    async fn correct_run_end_to_end_with_interpreted_solution() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.py");
        std::fs::write(&entry, "print('hi')").unwrap();
        let input = dir.path().join("01.in");
        std::fs::write(&input, "").unwrap();
        let expected = dir.path().join("01.out");
        std::fs::write(&expected, "hi\n").unwrap();

        let problem = sample_problem("hworld");
        let testcase = Testcase {
            problem: "hworld".to_string(),
            name: "01".to_string(),
            input_path: input,
            expected_answer_path: Some(expected),
            score: 3,
        };
        let solution = Solution {
            id: SolutionId {
                problem: "hworld".to_string(),
                author: "alice".to_string(),
            },
            source_files: vec![entry.clone()],
            entry_file: entry,
            status: SolutionStatus::Ready {
                language: "python".to_string(),
            },
        };
        let config = EffectiveConfig::default();

        let registry = StdArc::new(crate::languages::LanguageRegistry::builtin());
        let compiler = Compiler::new(registry, dir.path().join("scratch"));
        let runner = SubprocessRunner::new();
        let verifiers = VerifierRegistry::builtin();

        let run = judge(&solution, &problem, &testcase, &config, &compiler, &runner, &verifiers).await;
        match run.result {
            GradeResult::CorrectAnswer { score } => assert_eq!(score, 3),
            other => panic!("expected CorrectAnswer, got {other:?}"),
        }
    }
}
