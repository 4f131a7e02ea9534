//! Language registry (§4.1).
//!
//! A static catalog of supported languages, each with a file-extension
//! match, a declarative compile/run recipe and a default time limit.
//! Adding a language requires only registering a descriptor — there is no
//! per-language code path.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// A compile or run command template over `{source}`, `{source_dir}`,
/// `{artifact}`, `{artifact_dir}`, `{input_file}`, `{output_file}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub program: String,
    pub args: Vec<String>,
}

impl Recipe {
    pub fn parse(template: &str) -> Self {
        let mut parts = template.split_whitespace();
        let program = parts.next().unwrap_or_default().to_string();
        let args = parts.map(|s| s.to_string()).collect();
        Recipe { program, args }
    }

    /// Substitute all recognized `{var}` placeholders in program and args.
    pub fn instantiate(&self, vars: &RecipeVars) -> (String, Vec<String>) {
        let program = vars.substitute(&self.program);
        let args = self.args.iter().map(|a| vars.substitute(a)).collect();
        (program, args)
    }
}

/// Values available for substitution into a [`Recipe`].
#[derive(Debug, Clone, Default)]
pub struct RecipeVars {
    pub source: String,
    pub source_dir: String,
    pub artifact: String,
    pub artifact_dir: String,
    pub input_file: String,
    pub output_file: String,
    /// Best-effort memory hint (§4.5), substituted into `{memory_mb}` for
    /// runtimes whose command line accepts a heap-size flag (e.g. the JVM).
    pub memory_mb: u32,
}

impl RecipeVars {
    fn substitute(&self, template: &str) -> String {
        template
            .replace("{source_dir}", &self.source_dir)
            .replace("{source}", &self.source)
            .replace("{artifact_dir}", &self.artifact_dir)
            .replace("{artifact}", &self.artifact)
            .replace("{input_file}", &self.input_file)
            .replace("{output_file}", &self.output_file)
            .replace("{memory_mb}", &self.memory_mb.to_string())
    }
}

/// Immutable descriptor for one supported language.
#[derive(Debug, Clone)]
pub struct Language {
    pub id: String,
    pub extensions: Vec<String>,
    pub compile_recipe: Option<Recipe>,
    pub run_recipe: Recipe,
    pub default_time_limit_secs: f64,
}

impl Language {
    pub fn matches_extension(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.iter().any(|e| e == ext),
            None => false,
        }
    }
}

/// Raw TOML shape for `files/languages.toml`.
#[derive(Debug, Deserialize)]
struct RawLanguage {
    extensions: Vec<String>,
    compile_command: Option<String>,
    run_command: String,
    default_time_limit_secs: f64,
}

/// Result of [`Language`] classification over a solution's source files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Single(String),
    Ambiguous,
    Unknown,
}

/// Static catalog of languages, keyed by id.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: HashMap<String, Language>,
}

impl LanguageRegistry {
    /// Build the builtin catalog from the embedded TOML descriptor table.
    pub fn builtin() -> Self {
        let content = include_str!("../files/languages.toml");
        let raw: HashMap<String, RawLanguage> =
            toml::from_str(content).expect("embedded files/languages.toml must parse");

        let mut languages = HashMap::new();
        for (id, raw) in raw {
            let language = Language {
                id: id.clone(),
                extensions: raw.extensions,
                compile_recipe: raw.compile_command.as_deref().map(Recipe::parse),
                run_recipe: Recipe::parse(&raw.run_command),
                default_time_limit_secs: raw.default_time_limit_secs,
            };
            languages.insert(id, language);
        }

        LanguageRegistry { languages }
    }

    pub fn get(&self, id: &str) -> Option<&Language> {
        self.languages.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Language> {
        self.languages.values()
    }

    /// `detect(file_path) -> Language | None`: pure function of extension.
    pub fn detect(&self, path: &Path) -> Option<&Language> {
        self.languages.values().find(|lang| lang.matches_extension(path))
    }

    /// `classify(source_files) -> Language | Ambiguous | Unknown`.
    pub fn classify<'a>(&self, source_files: impl IntoIterator<Item = &'a Path>) -> Classification {
        let mut found: Option<String> = None;
        let mut any = false;
        for path in source_files {
            any = true;
            match self.detect(path) {
                Some(lang) => match &found {
                    None => found = Some(lang.id.clone()),
                    Some(existing) if existing == &lang.id => {}
                    Some(_) => return Classification::Ambiguous,
                },
                None => return Classification::Unknown,
            }
        }
        if !any {
            return Classification::Unknown;
        }
        match found {
            Some(id) => Classification::Single(id),
            None => Classification::Unknown,
        }
    }

    /// `available() -> list<{language, compiler_path, version, ok}>`.
    ///
    /// Probes each language's toolchain by running its version command
    /// with a short timeout, reporting success/failure. The only side
    /// effect is the subprocess call itself.
    pub async fn available(&self) -> Vec<ToolchainProbe> {
        let mut out = Vec::with_capacity(self.languages.len());
        for lang in self.languages.values() {
            let cmd = lang.compile_recipe.as_ref().unwrap_or(&lang.run_recipe);
            let probe = probe_toolchain(&lang.id, &cmd.program).await;
            out.push(probe);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ToolchainProbe {
    pub language: String,
    pub compiler_path: String,
    pub version: Option<String>,
    pub ok: bool,
}

async fn probe_toolchain(language: &str, program: &str) -> ToolchainProbe {
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        Command::new(program).arg("--version").output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string())
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    String::from_utf8_lossy(&output.stderr)
                        .lines()
                        .next()
                        .map(|s| s.to_string())
                });
            ToolchainProbe {
                language: language.to_string(),
                compiler_path: program.to_string(),
                ok: output.status.success(),
                version,
            }
        }
        Ok(Err(e)) => {
            debug!("toolchain probe for {} failed to spawn: {}", language, e);
            ToolchainProbe {
                language: language.to_string(),
                compiler_path: program.to_string(),
                ok: false,
                version: None,
            }
        }
        Err(_) => {
            debug!("toolchain probe for {} timed out", language);
            ToolchainProbe {
                language: language.to_string(),
                compiler_path: program.to_string(),
                ok: false,
                version: None,
            }
        }
    }
}
