//! Verifier registry (§4.3): pluggable output comparators.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VerifierVerdict {
    pub correct: bool,
    pub detail: Option<String>,
    /// Set when `detail` describes a format problem (extra/garbled tokens)
    /// rather than a semantic mismatch, per judge composition rule 7.
    pub format_error: bool,
}

impl VerifierVerdict {
    pub fn ok() -> Self {
        VerifierVerdict {
            correct: true,
            detail: None,
            format_error: false,
        }
    }

    pub fn wrong(detail: impl Into<String>) -> Self {
        VerifierVerdict {
            correct: false,
            detail: Some(detail.into()),
            format_error: false,
        }
    }

    pub fn format_error(detail: impl Into<String>) -> Self {
        VerifierVerdict {
            correct: false,
            detail: Some(detail.into()),
            format_error: true,
        }
    }
}

/// A named output comparator. Implementations read both files in a single
/// pass and must not mutate either.
pub trait Verifier: Send + Sync {
    fn verify(&self, expected_path: &Path, actual_path: &Path) -> anyhow::Result<VerifierVerdict>;
}

/// Byte-for-byte comparison after normalizing a trailing newline.
pub struct ExactBytes;

impl Verifier for ExactBytes {
    fn verify(&self, expected_path: &Path, actual_path: &Path) -> anyhow::Result<VerifierVerdict> {
        let expected = std::fs::read(expected_path)?;
        let actual = std::fs::read(actual_path)?;

        let normalize = |mut bytes: Vec<u8>| -> Vec<u8> {
            while bytes.last() == Some(&b'\n') || bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            bytes
        };

        if normalize(expected) == normalize(actual) {
            Ok(VerifierVerdict::ok())
        } else {
            Ok(VerifierVerdict::wrong("output does not match expected bytes"))
        }
    }
}

/// Tokenizes both streams by whitespace; every token must parse as an
/// integer; sequences must be equal length and element-wise equal.
pub struct IntegerSequence;

impl Verifier for IntegerSequence {
    fn verify(&self, expected_path: &Path, actual_path: &Path) -> anyhow::Result<VerifierVerdict> {
        let expected = std::fs::read_to_string(expected_path)?;
        let actual = std::fs::read_to_string(actual_path)?;

        let parse_tokens = |s: &str| -> Result<Vec<i64>, String> {
            s.split_whitespace()
                .map(|tok| tok.parse::<i64>().map_err(|_| format!("non-integer token: {tok:?}")))
                .collect()
        };

        let actual_tokens = match parse_tokens(&actual) {
            Ok(tokens) => tokens,
            Err(msg) => return Ok(VerifierVerdict::format_error(msg)),
        };
        let expected_tokens = match parse_tokens(&expected) {
            Ok(tokens) => tokens,
            Err(msg) => return Ok(VerifierVerdict::format_error(format!("expected file malformed: {msg}"))),
        };

        if actual_tokens.len() != expected_tokens.len() {
            return Ok(VerifierVerdict::wrong(format!(
                "expected {} integers, got {}",
                expected_tokens.len(),
                actual_tokens.len()
            )));
        }

        if actual_tokens == expected_tokens {
            Ok(VerifierVerdict::ok())
        } else {
            let idx = actual_tokens
                .iter()
                .zip(expected_tokens.iter())
                .position(|(a, e)| a != e)
                .unwrap_or(0);
            Ok(VerifierVerdict::wrong(format!(
                "mismatch at token {idx}: expected {}, got {}",
                expected_tokens[idx], actual_tokens[idx]
            )))
        }
    }
}

/// Like [`IntegerSequence`] but tokens parse as finite floats and compare
/// within `|a-b| <= max(abs_tol, rel_tol * |b|)`.
pub struct FloatSequence {
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl Default for FloatSequence {
    fn default() -> Self {
        FloatSequence {
            abs_tol: 1e-6,
            rel_tol: 1e-6,
        }
    }
}

impl Verifier for FloatSequence {
    fn verify(&self, expected_path: &Path, actual_path: &Path) -> anyhow::Result<VerifierVerdict> {
        let expected = std::fs::read_to_string(expected_path)?;
        let actual = std::fs::read_to_string(actual_path)?;

        let parse_tokens = |s: &str| -> Result<Vec<f64>, String> {
            s.split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>()
                        .map_err(|_| format!("non-numeric token: {tok:?}"))
                        .and_then(|v| if v.is_finite() { Ok(v) } else { Err(format!("non-finite token: {tok:?}")) })
                })
                .collect()
        };

        let actual_tokens = match parse_tokens(&actual) {
            Ok(tokens) => tokens,
            Err(msg) => return Ok(VerifierVerdict::format_error(msg)),
        };
        let expected_tokens = match parse_tokens(&expected) {
            Ok(tokens) => tokens,
            Err(msg) => return Ok(VerifierVerdict::format_error(format!("expected file malformed: {msg}"))),
        };

        if actual_tokens.len() != expected_tokens.len() {
            return Ok(VerifierVerdict::wrong(format!(
                "expected {} numbers, got {}",
                expected_tokens.len(),
                actual_tokens.len()
            )));
        }

        for (i, (&a, &e)) in actual_tokens.iter().zip(expected_tokens.iter()).enumerate() {
            let tolerance = self.abs_tol.max(self.rel_tol * e.abs());
            if (a - e).abs() > tolerance {
                return Ok(VerifierVerdict::wrong(format!(
                    "mismatch at token {i}: expected {e}, got {a} (tolerance {tolerance})"
                )));
            }
        }

        Ok(VerifierVerdict::ok())
    }
}

/// Tokenizes by whitespace; case-sensitive string equality per token.
pub struct WordSequence;

impl Verifier for WordSequence {
    fn verify(&self, expected_path: &Path, actual_path: &Path) -> anyhow::Result<VerifierVerdict> {
        let expected = std::fs::read_to_string(expected_path)?;
        let actual = std::fs::read_to_string(actual_path)?;

        let expected_tokens: Vec<&str> = expected.split_whitespace().collect();
        let actual_tokens: Vec<&str> = actual.split_whitespace().collect();

        if expected_tokens == actual_tokens {
            Ok(VerifierVerdict::ok())
        } else {
            Ok(VerifierVerdict::wrong("word sequence does not match"))
        }
    }
}

/// Named registry of verifiers, selected by a problem's `verifier` key.
/// Unknown names are the caller's responsibility to turn into
/// `InternalError`, per §4.3.
#[derive(Clone)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, Arc<dyn Verifier>>,
}

impl VerifierRegistry {
    pub fn builtin() -> Self {
        let mut verifiers: HashMap<String, Arc<dyn Verifier>> = HashMap::new();
        verifiers.insert("exact_bytes".to_string(), Arc::new(ExactBytes));
        verifiers.insert("integer_sequence".to_string(), Arc::new(IntegerSequence));
        verifiers.insert("float_sequence".to_string(), Arc::new(FloatSequence::default()));
        verifiers.insert("word_sequence".to_string(), Arc::new(WordSequence));
        VerifierRegistry { verifiers }
    }

    /// Register or override a verifier by name, e.g. a user-defined one.
    pub fn register(&mut self, name: impl Into<String>, verifier: Arc<dyn Verifier>) {
        self.verifiers.insert(name.into(), verifier);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Verifier>> {
        self.verifiers.get(name).cloned()
    }
}
