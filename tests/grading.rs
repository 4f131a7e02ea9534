//! End-to-end tests driving discovery and the dispatcher over a
//! synthetic problem tree, covering the concrete scenarios of the
//! grading contract.

use std::path::Path;
use std::sync::Arc;

use hammurabi::{
    discover, dispatch, generate_answers, Compiler, DispatchOptions, DispatchedRun, DiscoveryMode,
    EffectiveConfig, GenerateOutcome, GradeResult, LanguageRegistry, PairFilter, SubprocessRunner,
    VerifierRegistry,
};
use tokio_util::sync::CancellationToken;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

async fn run_all(
    problem_root: &Path,
    mode: DiscoveryMode,
) -> Vec<DispatchedRun> {
    let config = EffectiveConfig::default();
    let registry = Arc::new(LanguageRegistry::builtin());
    let verifiers = Arc::new(VerifierRegistry::builtin());
    let inventory = discover(problem_root, &config, &registry, mode);

    let scratch = tempfile::tempdir().unwrap();
    let filter: Box<PairFilter> = Box::new(|_, _, _| true);
    dispatch(
        &inventory,
        &config,
        registry,
        verifiers,
        &*filter,
        DispatchOptions {
            parallelism: 2,
            scratch_root: scratch.path().to_path_buf(),
        },
        CancellationToken::new(),
    )
    .await
}

fn completed(runs: &[DispatchedRun]) -> Vec<&hammurabi::TestRun> {
    runs.iter()
        .filter_map(|r| match r {
            DispatchedRun::Completed(run) => Some(run),
            DispatchedRun::Cancelled { .. } => None,
        })
        .collect()
}

/// Scenario 1: hello-world, a correct Python solution reading N and
/// printing N greeting lines.
#[tokio::test]
async fn hello_world_correct_run_scores_full_marks() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(&root.join("hworld/testcases/01.in"), "3\n");
    write(
        &root.join("hworld/answers/01.out"),
        "Hello world!\nHello world!\nHello world!",
    );
    write(
        &root.join("hworld/solutions/alice/main.py"),
        "n = int(input())\nfor _ in range(n):\n    print('Hello world!')\n",
    );

    let runs = run_all(root, DiscoveryMode::Grade).await;
    let completed = completed(&runs);
    assert_eq!(completed.len(), 1);
    match &completed[0].result {
        GradeResult::CorrectAnswer { score } => assert_eq!(*score, 1),
        other => panic!("expected CorrectAnswer, got {other:?}"),
    }
}

/// Scenario 2: same problem, a solution that prints one extra line.
#[tokio::test]
async fn extra_line_is_wrong_answer() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(&root.join("hworld/testcases/01.in"), "3\n");
    write(
        &root.join("hworld/answers/01.out"),
        "Hello world!\nHello world!\nHello world!",
    );
    write(
        &root.join("hworld/solutions/bob/main.py"),
        "n = int(input())\nfor _ in range(n + 1):\n    print('Hello world!')\n",
    );

    let runs = run_all(root, DiscoveryMode::Grade).await;
    let completed = completed(&runs);
    assert_eq!(completed.len(), 1);
    match &completed[0].result {
        GradeResult::WrongAnswer { .. } => {}
        other => panic!("expected WrongAnswer, got {other:?}"),
    }
}

/// Scenario 3: a solution that sleeps well past a tight per-problem
/// time-limit override.
#[tokio::test]
async fn sleeping_solution_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(&root.join("slow/testcases/01.in"), "\n");
    write(&root.join("slow/answers/01.out"), "done\n");
    write(
        &root.join("slow/solutions/carol/main.py"),
        "import time\ntime.sleep(30)\nprint('done')\n",
    );
    write(
        &root.join("slow/problem.toml"),
        "[limits.time]\npython = 0.2\n",
    );

    let runs = run_all(root, DiscoveryMode::Grade).await;
    let completed = completed(&runs);
    assert_eq!(completed.len(), 1);
    assert!(matches!(completed[0].result, GradeResult::TimeLimitExceeded));
}

/// Scenario 4: a C++ solution with a syntax error never reaches the
/// runner.
#[tokio::test]
async fn broken_cpp_is_compilation_error() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(&root.join("cpp_prob/testcases/01.in"), "1\n");
    write(&root.join("cpp_prob/answers/01.out"), "1\n");
    write(
        &root.join("cpp_prob/solutions/dave/main.cpp"),
        "int main() { return 0 // missing semicolon and brace\n",
    );

    let runs = run_all(root, DiscoveryMode::Grade).await;
    let completed = completed(&runs);
    assert_eq!(completed.len(), 1);
    match &completed[0].result {
        GradeResult::CompilationError { compiler_output } => {
            assert!(compiler_output.is_some());
        }
        other => panic!("expected CompilationError, got {other:?}"),
    }
    assert!(completed[0].run_outcome.is_none());
}

/// Scenario 5: reference mode generates the answer key from `_reference`'s
/// actual stdout rather than grading it against a pre-existing answer.
#[tokio::test]
async fn reference_mode_generates_answer_key_from_reference_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(&root.join("hworld/testcases/01.in"), "2\n");
    write(
        &root.join("hworld/solutions/_reference/main.py"),
        "print('Hello world!')\nprint('Hello world!')\n",
    );
    write(
        &root.join("hworld/solutions/alice/main.py"),
        "print('Hello world!')\nprint('Hello world!')\n",
    );

    let config = EffectiveConfig::default();
    let registry = Arc::new(LanguageRegistry::builtin());
    let inventory = discover(root, &config, &registry, DiscoveryMode::Reference);

    // Only _reference participates in the inventory, never alice.
    let authors: Vec<_> = inventory.solutions.iter().map(|s| s.author()).collect();
    assert_eq!(authors, vec!["_reference"]);

    let scratch = tempfile::tempdir().unwrap();
    let compiler = Compiler::new(registry, scratch.path().to_path_buf());
    let runner = SubprocessRunner::new();
    let outcomes = generate_answers(&inventory, &config, &compiler, &runner).await;

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], GenerateOutcome::Written { .. }));

    let answer_path = root.join("hworld/answers/01.out");
    assert!(answer_path.is_file());
    let content = std::fs::read_to_string(&answer_path).unwrap();
    assert_eq!(content, "Hello world!\nHello world!\n");
}

/// Scenario 6: a float-sequence verifier accepts a tiny relative error
/// and rejects a large one.
#[tokio::test]
async fn float_tolerance_is_enforced_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(&root.join("approx/testcases/01.in"), "\n");
    write(&root.join("approx/answers/01.out"), "0.3333333");
    write(&root.join("approx/problem.toml"), "verifier = \"float_sequence\"\n");
    write(
        &root.join("approx/solutions/erin/main.py"),
        "print(0.3333334)\n",
    );
    write(
        &root.join("approx/solutions/frank/main.py"),
        "print(0.334)\n",
    );

    let runs = run_all(root, DiscoveryMode::Grade).await;
    let completed = completed(&runs);
    assert_eq!(completed.len(), 2);

    let erin = completed.iter().find(|r| r.solution_author == "erin").unwrap();
    let frank = completed.iter().find(|r| r.solution_author == "frank").unwrap();
    assert!(erin.result.is_correct());
    assert!(!frank.result.is_correct());
}

/// Empty problem root yields no problems and no test runs.
#[tokio::test]
async fn empty_problem_root_yields_no_runs() {
    let dir = tempfile::tempdir().unwrap();
    let runs = run_all(dir.path(), DiscoveryMode::Grade).await;
    assert!(runs.is_empty());
}

/// A testcase with no matching answer file grades as MissingAnswer
/// rather than aborting the run.
#[tokio::test]
async fn missing_answer_file_yields_missing_answer_status() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(&root.join("orphan/testcases/01.in"), "1\n");
    write(&root.join("orphan/solutions/alice/main.py"), "print(1)\n");

    let runs = run_all(root, DiscoveryMode::Grade).await;
    let completed = completed(&runs);
    assert_eq!(completed.len(), 1);
    assert!(matches!(completed[0].result, GradeResult::MissingAnswer));
}
