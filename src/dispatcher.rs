//! Dispatcher (§4.7): enumerates `(solution, testcase)` pairs from an
//! [`Inventory`], schedules them across a bounded worker pool, and
//! aggregates results in enumeration order.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::compiler::Compiler;
use crate::config::EffectiveConfig;
use crate::discovery::{Inventory, Solution, Testcase};
use crate::judge::{judge, TestRun};
use crate::result::GradeResult;
use crate::runner::{Runner, SubprocessRunner};
use crate::verifier::VerifierRegistry;

/// `(problem_name, author_name, testcase_name) -> bool`.
pub type PairFilter = dyn Fn(&str, &str, &str) -> bool + Send + Sync;

/// Scheduling knobs for one grading run (§4.7, §5).
pub struct DispatchOptions {
    /// Number of concurrent workers. 1 means strict serial execution.
    pub parallelism: usize,
    pub scratch_root: std::path::PathBuf,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            parallelism: 1,
            scratch_root: std::env::temp_dir().join("hammurabi-scratch"),
        }
    }
}

/// Outcome of one dispatched run: tagged partial when the cancellation
/// token fired before this pair could be judged.
#[derive(Debug, Clone)]
pub enum DispatchedRun {
    Completed(TestRun),
    Cancelled { problem: String, author: String, testcase: String },
}

/// Enumerate pairs matching `filter`, dispatch them to a bounded worker
/// pool, and return results in the original enumeration order —
/// independent of completion order (§4.7, §5 ordering guarantees).
pub async fn dispatch(
    inventory: &Inventory,
    config: &EffectiveConfig,
    registry: Arc<crate::languages::LanguageRegistry>,
    verifiers: Arc<VerifierRegistry>,
    filter: &PairFilter,
    options: DispatchOptions,
    cancel: CancellationToken,
) -> Vec<DispatchedRun> {
    let pairs = enumerate_pairs(inventory, filter);
    let total = pairs.len();
    info!("dispatching {} (solution, testcase) pairs", total);

    let compiler = Arc::new(Compiler::new(registry.clone(), options.scratch_root.clone()));
    let runner: Arc<dyn Runner> = Arc::new(SubprocessRunner::new());
    let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));

    // Bounded channel sized P*4 as backpressure (§4.7); a worker that
    // finishes cannot outrun the aggregator by more than this margin.
    let channel_capacity = options.parallelism.max(1) * 4;
    let (tx, mut rx) = mpsc::channel::<(usize, DispatchedRun)>(channel_capacity);

    let mut slots: Vec<Option<DispatchedRun>> = (0..total).map(|_| None).collect();

    let mut handles = Vec::with_capacity(total);
    for (index, (solution, problem, testcase)) in pairs.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let compiler = compiler.clone();
        let runner = runner.clone();
        let verifiers = verifiers.clone();
        let config = config.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();

        let handle = tokio::spawn(async move {
            if cancel.is_cancelled() {
                let _ = tx
                    .send((
                        index,
                        DispatchedRun::Cancelled {
                            problem: solution.problem().to_string(),
                            author: solution.author().to_string(),
                            testcase: testcase.name.clone(),
                        },
                    ))
                    .await;
                return;
            }

            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.expect("semaphore never closed"),
                _ = cancel.cancelled() => {
                    let _ = tx.send((index, DispatchedRun::Cancelled {
                        problem: solution.problem().to_string(),
                        author: solution.author().to_string(),
                        testcase: testcase.name.clone(),
                    })).await;
                    return;
                }
            };

            let run = tokio::select! {
                run = judge(&solution, &problem, &testcase, &config, &compiler, runner.as_ref(), &verifiers) => {
                    DispatchedRun::Completed(run)
                }
                _ = cancel.cancelled() => DispatchedRun::Cancelled {
                    problem: solution.problem().to_string(),
                    author: solution.author().to_string(),
                    testcase: testcase.name.clone(),
                },
            };

            let _ = tx.send((index, run)).await;
        });
        handles.push(handle);
    }
    drop(tx);

    while let Some((index, run)) = rx.recv().await {
        slots[index] = Some(run);
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("dispatcher worker task panicked: {}", e);
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                warn!("pair at index {} never reported a result", i);
                DispatchedRun::Cancelled {
                    problem: String::new(),
                    author: String::new(),
                    testcase: String::new(),
                }
            })
        })
        .collect()
}

fn enumerate_pairs<'a>(
    inventory: &'a Inventory,
    filter: &PairFilter,
) -> Vec<(Solution, crate::discovery::Problem, Testcase)> {
    let mut pairs = Vec::new();
    for solution in &inventory.solutions {
        let problem = match inventory.problems.iter().find(|p| p.name == solution.problem()) {
            Some(p) => p,
            None => continue,
        };
        for testcase in inventory
            .testcases
            .iter()
            .filter(|t| t.problem == solution.problem())
        {
            if filter(solution.problem(), solution.author(), &testcase.name) {
                pairs.push((solution.clone(), problem.clone(), testcase.clone()));
            }
        }
    }
    pairs
}

/// Extracts the score total over a completed run set, ignoring cancelled
/// and un-completed entries (used by the CLI summary, not by reports).
pub fn total_score(runs: &[DispatchedRun]) -> i32 {
    runs.iter()
        .filter_map(|r| match r {
            DispatchedRun::Completed(run) => Some(run.result.score()),
            DispatchedRun::Cancelled { .. } => None,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryMode, SolutionId, SolutionStatus};
    use crate::languages::LanguageRegistry;

    fn build_inventory() -> Inventory {
        let problem = crate::discovery::Problem {
            name: "hworld".to_string(),
            root_path: std::path::PathBuf::new(),
            input_filename: "input.txt".to_string(),
            output_filename: "output.txt".to_string(),
            verifier_name: "exact_bytes".to_string(),
            testcase_scores: Default::default(),
            time_limit_overrides: Default::default(),
        };
        let solution = Solution {
            id: SolutionId {
                problem: "hworld".to_string(),
                author: "alice".to_string(),
            },
            source_files: vec![],
            entry_file: std::path::PathBuf::new(),
            status: SolutionStatus::Ready {
                language: "python".to_string(),
            },
        };
        let testcase = Testcase {
            problem: "hworld".to_string(),
            name: "01".to_string(),
            input_path: std::path::PathBuf::from("/dev/null"),
            expected_answer_path: None,
            score: 1,
        };
        Inventory {
            problems: vec![problem],
            solutions: vec![solution],
            testcases: vec![testcase],
        }
    }

    #[tokio::test]
    async fn dispatch_yields_one_run_per_pair_in_enumeration_order() {
        let inventory = build_inventory();
        let config = EffectiveConfig::default();
        let registry = Arc::new(LanguageRegistry::builtin());
        let verifiers = Arc::new(VerifierRegistry::builtin());
        let dir = tempfile::tempdir().unwrap();

        let filter: Box<PairFilter> = Box::new(|_, _, _| true);
        let runs = dispatch(
            &inventory,
            &config,
            registry,
            verifiers,
            &*filter,
            DispatchOptions {
                parallelism: 2,
                scratch_root: dir.path().to_path_buf(),
            },
            CancellationToken::new(),
        )
        .await;

        assert_eq!(runs.len(), 1);
        match &runs[0] {
            DispatchedRun::Completed(run) => {
                assert!(matches!(run.result, GradeResult::MissingAnswer));
            }
            other => panic!("expected a completed run, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn filter_excludes_non_matching_pairs() {
        let inventory = build_inventory();
        let config = EffectiveConfig::default();
        let registry = Arc::new(LanguageRegistry::builtin());
        let verifiers = Arc::new(VerifierRegistry::builtin());
        let dir = tempfile::tempdir().unwrap();

        let filter: Box<PairFilter> = Box::new(|_, author, _| author == "nobody");
        let runs = dispatch(
            &inventory,
            &config,
            registry,
            verifiers,
            &*filter,
            DispatchOptions {
                parallelism: 1,
                scratch_root: dir.path().to_path_buf(),
            },
            CancellationToken::new(),
        )
        .await;

        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_marks_pairs_cancelled() {
        let inventory = build_inventory();
        let config = EffectiveConfig::default();
        let registry = Arc::new(LanguageRegistry::builtin());
        let verifiers = Arc::new(VerifierRegistry::builtin());
        let dir = tempfile::tempdir().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let filter: Box<PairFilter> = Box::new(|_, _, _| true);
        let runs = dispatch(
            &inventory,
            &config,
            registry,
            verifiers,
            &*filter,
            DispatchOptions {
                parallelism: 1,
                scratch_root: dir.path().to_path_buf(),
            },
            cancel,
        )
        .await;

        assert_eq!(runs.len(), 1);
        assert!(matches!(runs[0], DispatchedRun::Cancelled { .. }));
    }

    // DiscoveryMode is exercised by discovery's own tests; referenced here
    // only to document that the dispatcher is mode-agnostic — it consumes
    // whatever inventory discovery produced, regardless of which mode
    // built it.
    #[allow(dead_code)]
    fn _uses_discovery_mode(_m: DiscoveryMode) {}
}
