//! Thin CLI entry point: loads configuration, discovers the problem
//! tree, dispatches grading, and prints a terse summary. Argument
//! parsing, banners, and HTML report rendering are deliberately minimal
//! here — richer front-ends are expected to depend on this crate as a
//! library instead.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use hammurabi::{
    discover, dispatch, DispatchOptions, DispatchedRun, DiscoveryMode, HarnessError,
    LanguageRegistry, VerifierRegistry,
};

fn parse_args() -> (PathBuf, Option<PathBuf>) {
    let mut args = std::env::args().skip(1);
    let problem_root = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let config_path = args.next().map(PathBuf::from);
    (problem_root, config_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (problem_root, config_path) = parse_args();

    if !problem_root.exists() {
        return Err(HarnessError::ProblemRootMissing(problem_root).into());
    }
    if !problem_root.is_dir() {
        return Err(HarnessError::ProblemRootNotADirectory(problem_root).into());
    }

    let config_path = config_path.unwrap_or_else(|| problem_root.join("hammurabi.toml"));
    let config = hammurabi::config::load(&config_path, &problem_root)
        .context("failed to load configuration")?;

    let registry = Arc::new(LanguageRegistry::builtin());
    let verifiers = Arc::new(VerifierRegistry::builtin());

    let inventory = discover(&problem_root, &config, &registry, DiscoveryMode::Grade);
    tracing::info!(
        "discovered {} problems, {} solutions, {} testcases",
        inventory.problems.len(),
        inventory.solutions.len(),
        inventory.testcases.len()
    );

    let scratch_root = std::env::temp_dir().join(format!("hammurabi-run-{}", std::process::id()));
    let options = DispatchOptions {
        parallelism: 1,
        scratch_root,
    };

    let filter: Box<hammurabi::PairFilter> = Box::new(|_, _, _| true);
    let runs = dispatch(
        &inventory,
        &config,
        registry,
        verifiers,
        &*filter,
        options,
        CancellationToken::new(),
    )
    .await;

    print_summary(&runs);
    Ok(())
}

fn print_summary(runs: &[DispatchedRun]) {
    let mut correct = 0;
    let mut total = 0;
    let mut by_status: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();

    for run in runs {
        total += 1;
        match run {
            DispatchedRun::Completed(run) => {
                if run.result.is_correct() {
                    correct += 1;
                }
                *by_status.entry(run.result.status_code()).or_insert(0) += 1;
            }
            DispatchedRun::Cancelled { .. } => {
                *by_status.entry("CANCELLED").or_insert(0) += 1;
            }
        }
    }

    println!("graded {total} pair(s), {correct} correct");
    for (status, count) in &by_status {
        println!("  {status}: {count}");
    }
}
