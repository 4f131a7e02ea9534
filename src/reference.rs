//! Reference-answer generation (§4.2, §8 scenario 5): runs the
//! `_reference` solution of each problem and copies its stdout into
//! `answers/<testcase>.out`, rather than grading it against an existing
//! answer key. Pairs with `discover(..., DiscoveryMode::Reference)`, whose
//! inventory only contains `_reference` solutions.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::compiler::{BuildStatus, Compiler};
use crate::config::EffectiveConfig;
use crate::discovery::{Inventory, SolutionStatus};
use crate::languages::{Language, LanguageRegistry};
use crate::runner::{ExitKind, RunLimits, Runner};

#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Written {
        problem: String,
        testcase: String,
        answer_path: PathBuf,
    },
    Failed {
        problem: String,
        testcase: String,
        reason: String,
    },
}

/// Builds and runs each problem's `_reference` solution against every
/// discovered testcase, writing its stdout to `answers/<testcase>.out`.
/// Expects `inventory` to have been discovered with
/// `DiscoveryMode::Reference`; problems with no `_reference` solution are
/// skipped with a warning rather than aborting the whole generation pass.
pub async fn generate_answers(
    inventory: &Inventory,
    config: &EffectiveConfig,
    compiler: &Compiler,
    runner: &dyn Runner,
) -> Vec<GenerateOutcome> {
    let mut outcomes = Vec::new();

    for problem in &inventory.problems {
        let testcases: Vec<_> = inventory
            .testcases
            .iter()
            .filter(|t| t.problem == problem.name)
            .collect();

        let Some(reference) = inventory
            .solutions
            .iter()
            .find(|s| s.problem() == problem.name && s.is_reference())
        else {
            warn!("no _reference solution for problem {}, skipping", problem.name);
            continue;
        };

        let build = compiler.build(reference).await;
        if build.status != BuildStatus::Ok {
            let reason = build
                .compiler_output
                .clone()
                .unwrap_or_else(|| "_reference solution failed to build".to_string());
            for testcase in &testcases {
                outcomes.push(GenerateOutcome::Failed {
                    problem: problem.name.clone(),
                    testcase: testcase.name.clone(),
                    reason: reason.clone(),
                });
            }
            continue;
        }

        let language_id = match &reference.status {
            SolutionStatus::Ready { language } => language.clone(),
            _ => unreachable!("Ok build implies a resolved language"),
        };
        let language = language_for(&language_id);

        let time_limit_secs = problem
            .time_limit_overrides
            .get(&language_id)
            .copied()
            .unwrap_or(language.default_time_limit_secs);
        let limits = RunLimits {
            time_limit_ms: (time_limit_secs * config.limits.time_limit_multiplier * 1000.0).round() as u64,
            memory_limit_mb: config.limits.memory,
        };

        let artifact_path = build.artifact_path.clone().unwrap_or_default();
        let work_dir = build.work_dir.clone().unwrap_or_default();

        let answers_dir = problem.root_path.join("answers");
        if let Err(e) = std::fs::create_dir_all(&answers_dir) {
            warn!("failed to create answers dir for {}: {}", problem.name, e);
            for testcase in &testcases {
                outcomes.push(GenerateOutcome::Failed {
                    problem: problem.name.clone(),
                    testcase: testcase.name.clone(),
                    reason: format!("failed to create answers directory: {e}"),
                });
            }
            continue;
        }

        for testcase in &testcases {
            let scratch_output = work_dir.join(format!("{}.actual", testcase.name));
            let run_outcome = runner
                .run(
                    &language,
                    &artifact_path,
                    &work_dir,
                    &testcase.input_path,
                    &scratch_output,
                    &limits,
                )
                .await;

            match &run_outcome.exit_kind {
                ExitKind::Normal(0) => {
                    let answer_path = answers_dir.join(format!("{}.out", testcase.name));
                    match std::fs::copy(&scratch_output, &answer_path) {
                        Ok(_) => {
                            info!("generated answer {}/{}", problem.name, testcase.name);
                            outcomes.push(GenerateOutcome::Written {
                                problem: problem.name.clone(),
                                testcase: testcase.name.clone(),
                                answer_path,
                            });
                        }
                        Err(e) => outcomes.push(GenerateOutcome::Failed {
                            problem: problem.name.clone(),
                            testcase: testcase.name.clone(),
                            reason: format!("failed to write answer file: {e}"),
                        }),
                    }
                }
                other => outcomes.push(GenerateOutcome::Failed {
                    problem: problem.name.clone(),
                    testcase: testcase.name.clone(),
                    reason: format!("_reference run did not complete normally: {other:?}"),
                }),
            }
        }
    }

    outcomes
}

fn language_for(language_id: &str) -> Language {
    LanguageRegistry::builtin()
        .get(language_id)
        .cloned()
        .expect("language_id originates from a successful classification")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectiveConfig;
    use crate::discovery::{discover, DiscoveryMode};
    use crate::languages::LanguageRegistry;
    use crate::runner::SubprocessRunner;
    use std::sync::Arc;

    fn write(path: &std::path::Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn generates_answer_file_from_reference_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write(&root.join("hworld/testcases/01.in"), "2\n");
        write(
            &root.join("hworld/solutions/_reference/main.py"),
            "print('Hello world!')\nprint('Hello world!')\n",
        );

        let config = EffectiveConfig::default();
        let registry = Arc::new(LanguageRegistry::builtin());
        let inventory = discover(root, &config, &registry, DiscoveryMode::Reference);

        let scratch = tempfile::tempdir().unwrap();
        let compiler = Compiler::new(registry, scratch.path().to_path_buf());
        let runner = SubprocessRunner::new();

        let outcomes = generate_answers(&inventory, &config, &compiler, &runner).await;

        assert_eq!(outcomes.len(), 1);
        let answer_path = root.join("hworld/answers/01.out");
        match &outcomes[0] {
            GenerateOutcome::Written { answer_path: p, .. } => assert_eq!(p, &answer_path),
            other => panic!("expected Written, got {other:?}"),
        }

        let content = std::fs::read_to_string(&answer_path).unwrap();
        assert_eq!(content, "Hello world!\nHello world!\n");
    }

    #[tokio::test]
    async fn missing_reference_solution_is_skipped_without_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write(&root.join("hworld/testcases/01.in"), "1\n");
        // Only a non-reference author; Reference mode filters it out,
        // leaving the problem with no _reference solution to run.
        write(&root.join("hworld/solutions/alice/main.py"), "print(1)\n");

        let config = EffectiveConfig::default();
        let registry = Arc::new(LanguageRegistry::builtin());
        let inventory = discover(root, &config, &registry, DiscoveryMode::Reference);

        let scratch = tempfile::tempdir().unwrap();
        let compiler = Compiler::new(registry, scratch.path().to_path_buf());
        let runner = SubprocessRunner::new();

        let outcomes = generate_answers(&inventory, &config, &compiler, &runner).await;
        assert!(outcomes.is_empty());
        assert!(!root.join("hworld/answers/01.out").exists());
    }
}
