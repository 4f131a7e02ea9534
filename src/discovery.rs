//! Discovery (§4.2): walks the problem root into a structured inventory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::{load_problem_override, EffectiveConfig, ProblemOverride};
use crate::languages::{Classification, LanguageRegistry};

pub const REFERENCE_AUTHOR: &str = "_reference";

#[derive(Debug, Clone)]
pub struct Problem {
    pub name: String,
    pub root_path: PathBuf,
    pub input_filename: String,
    pub output_filename: String,
    pub verifier_name: String,
    pub testcase_scores: HashMap<String, i32>,
    /// Per-language time-limit overrides, in seconds.
    pub time_limit_overrides: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct Testcase {
    pub problem: String,
    pub name: String,
    pub input_path: PathBuf,
    pub expected_answer_path: Option<PathBuf>,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SolutionId {
    pub problem: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub enum SolutionStatus {
    Ready { language: String },
    LanguageAmbiguous,
    LanguageUnknown,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub id: SolutionId,
    pub source_files: Vec<PathBuf>,
    pub entry_file: PathBuf,
    pub status: SolutionStatus,
}

impl Solution {
    pub fn problem(&self) -> &str {
        &self.id.problem
    }

    pub fn author(&self) -> &str {
        &self.id.author
    }

    pub fn is_reference(&self) -> bool {
        self.id.author == REFERENCE_AUTHOR
    }
}

#[derive(Debug, Default)]
pub struct Inventory {
    pub problems: Vec<Problem>,
    pub solutions: Vec<Solution>,
    pub testcases: Vec<Testcase>,
}

/// Mode controlling whether `_reference` solutions participate in the
/// inventory and whether ordinary authors do (§4.2, §8 scenario 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Grade ordinary authors; exclude `_reference`.
    Grade,
    /// Only include `_reference`, for answer-key generation.
    Reference,
}

/// Walk `problem_root`, yielding a structured, lexicographically ordered
/// [`Inventory`]. Errors for individual directories are logged and the
/// directory is skipped; discovery itself never fails outright (a missing
/// `problem_root` is a harness error checked by the caller beforehand).
pub fn discover(
    problem_root: &Path,
    config: &EffectiveConfig,
    registry: &LanguageRegistry,
    mode: DiscoveryMode,
) -> Inventory {
    let mut inventory = Inventory::default();

    let mut problem_dirs: Vec<PathBuf> = match std::fs::read_dir(problem_root) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(e) => {
            warn!("failed to read problem root {:?}: {}", problem_root, e);
            return inventory;
        }
    };
    problem_dirs.sort();

    for problem_dir in problem_dirs {
        let name = match problem_dir.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        let solutions_dir = problem_dir.join("solutions");
        let testcases_dir = problem_dir.join("testcases");
        if !solutions_dir.is_dir() || !testcases_dir.is_dir() {
            warn!(
                "skipping {:?}: missing solutions/ or testcases/ sub-tree",
                problem_dir
            );
            continue;
        }

        let problem = build_problem(&name, &problem_dir, config);

        let answers_dir = problem_dir.join("answers");
        let testcases = discover_testcases(&problem, &testcases_dir, &answers_dir);

        let mut author_dirs: Vec<PathBuf> = match std::fs::read_dir(&solutions_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect(),
            Err(e) => {
                warn!("failed to read solutions/ for {}: {}", name, e);
                Vec::new()
            }
        };
        author_dirs.sort();

        for author_dir in author_dirs {
            let author = match author_dir.file_name().and_then(|n| n.to_str()) {
                Some(a) => a.to_string(),
                None => continue,
            };

            let is_reference = author == REFERENCE_AUTHOR;
            if is_reference != (mode == DiscoveryMode::Reference) {
                continue;
            }
            if author.starts_with('_') && !is_reference {
                // Reserved namespace; only `_reference` is recognized (§6).
                continue;
            }

            let solution = build_solution(&name, &author, &author_dir, registry);
            inventory.solutions.push(solution);
        }

        inventory.testcases.extend(testcases);
        inventory.problems.push(problem);
    }

    inventory
}

fn build_problem(name: &str, root_path: &Path, config: &EffectiveConfig) -> Problem {
    let mut input_filename = "input.txt".to_string();
    let mut output_filename = "output.txt".to_string();
    let mut verifier_name = "exact_bytes".to_string();
    let mut testcase_scores = HashMap::new();
    let mut time_limit_overrides = config.limits.time.clone();

    let over: Option<ProblemOverride> = ["toml", "json"]
        .iter()
        .find_map(|ext| {
            let path = root_path.join(format!("problem.{ext}"));
            if path.exists() {
                load_problem_override(&path)
            } else {
                None
            }
        });

    if let Some(over) = over {
        if let Some(v) = over.verifier {
            verifier_name = v;
        }
        if let Some(f) = over.problem_input_file {
            input_filename = f;
        }
        if let Some(f) = over.problem_output_file {
            output_filename = f;
        }
        testcase_scores = over.testcase_score;
        for (lang, secs) in over.limits.time {
            time_limit_overrides.insert(lang, secs);
        }
    }

    Problem {
        name: name.to_string(),
        root_path: root_path.to_path_buf(),
        input_filename,
        output_filename,
        verifier_name,
        testcase_scores,
        time_limit_overrides,
    }
}

fn discover_testcases(problem: &Problem, testcases_dir: &Path, answers_dir: &Path) -> Vec<Testcase> {
    let mut entries: Vec<PathBuf> = match std::fs::read_dir(testcases_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("in"))
            .collect(),
        Err(e) => {
            warn!("failed to read testcases/ for {}: {}", problem.name, e);
            Vec::new()
        }
    };
    entries.sort();

    entries
        .into_iter()
        .filter_map(|input_path| {
            let stem = input_path.file_stem()?.to_str()?.to_string();
            let expected = answers_dir.join(format!("{stem}.out"));
            let expected_answer_path = if expected.is_file() { Some(expected) } else { None };
            let score = *problem.testcase_scores.get(&stem).unwrap_or(&1);

            if expected_answer_path.is_none() {
                warn!(
                    "testcase {}/{} has no matching answer file",
                    problem.name, stem
                );
            }

            Some(Testcase {
                problem: problem.name.clone(),
                name: stem,
                input_path,
                expected_answer_path,
                score,
            })
        })
        .collect()
}

fn build_solution(
    problem: &str,
    author: &str,
    author_dir: &Path,
    registry: &LanguageRegistry,
) -> Solution {
    let mut source_files = Vec::new();
    collect_source_files(author_dir, &mut source_files);
    source_files.sort();

    let id = SolutionId {
        problem: problem.to_string(),
        author: author.to_string(),
    };

    let classification = registry.classify(source_files.iter().map(|p| p.as_path()));
    let (status, entry_file) = match classification {
        Classification::Single(lang) => {
            let entry = pick_entry_file(&source_files, &lang);
            (SolutionStatus::Ready { language: lang }, entry)
        }
        Classification::Ambiguous => (
            SolutionStatus::LanguageAmbiguous,
            source_files.first().cloned().unwrap_or_default(),
        ),
        Classification::Unknown => (
            SolutionStatus::LanguageUnknown,
            source_files.first().cloned().unwrap_or_default(),
        ),
    };

    Solution {
        id,
        source_files,
        entry_file,
        status,
    }
}

fn collect_source_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("failed to read solution directory {:?}: {}", dir, e);
            return;
        }
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_source_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

/// Prefer a conventionally named entry point (`main.<ext>`) when present,
/// falling back to the lexicographically first source file.
fn pick_entry_file(source_files: &[PathBuf], language: &str) -> PathBuf {
    let registry = LanguageRegistry::builtin();
    if let Some(lang) = registry.get(language) {
        for file in source_files {
            if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                if stem.eq_ignore_ascii_case("main") && lang.matches_extension(file) {
                    return file.clone();
                }
            }
        }
    }
    source_files.first().cloned().unwrap_or_default()
}
