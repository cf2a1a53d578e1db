//! Test-case enumeration and corpus identity.
//!
//! A corpus directory either carries a `manifest.json` describing each case
//! explicitly, or it is scanned for `.csc` sources: one case per file,
//! expected to compile and exit 0. Cases are independent of each other by
//! construction; nothing here introduces cross-case ordering.

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const SOURCE_EXTENSION: &str = "csc";
pub const MANIFEST_NAME: &str = "manifest.json";

/// What a test case is expected to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Compile must succeed and the produced binary must exit with this
    /// code.
    ExitCode(i32),

    /// Compile-only case: the emitted diagnostic codes must equal this set.
    Diagnostics(Vec<u16>),
}

/// A named unit of work. Read-only once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub files: Vec<PathBuf>,
    pub expectation: Expectation,
}

impl TestCase {
    /// Whether the case's binary is executed after a successful compile.
    pub fn wants_run(&self) -> bool {
        matches!(self.expectation, Expectation::ExitCode(_))
    }
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    files: Vec<PathBuf>,
    #[serde(default)]
    expected_exit_code: Option<i32>,
    #[serde(default)]
    expected_diagnostics: Option<Vec<u16>>,
}

/// Load every test case under `dir`.
pub fn load_corpus(dir: &Path) -> Result<Vec<TestCase>> {
    let manifest = dir.join(MANIFEST_NAME);
    let cases = if manifest.is_file() {
        load_manifest(&manifest, dir)?
    } else {
        scan_directory(dir)?
    };
    ensure_unique_ids(&cases)?;
    Ok(cases)
}

fn load_manifest(path: &Path, base: &Path) -> Result<Vec<TestCase>> {
    let text = fs::read_to_string(path)?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&text)?;

    entries
        .into_iter()
        .map(|entry| {
            let expectation = match (entry.expected_exit_code, entry.expected_diagnostics) {
                (Some(_), Some(_)) => {
                    return Err(HarnessError::Corpus(format!(
                        "case `{}` declares both an exit code and a diagnostic set",
                        entry.id
                    )))
                }
                (None, Some(codes)) => Expectation::Diagnostics(codes),
                (Some(code), None) => Expectation::ExitCode(code),
                (None, None) => Expectation::ExitCode(0),
            };
            Ok(TestCase {
                id: entry.id,
                files: entry.files.iter().map(|f| base.join(f)).collect(),
                expectation,
            })
        })
        .collect()
}

fn scan_directory(dir: &Path) -> Result<Vec<TestCase>> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    // Stable order, so the corpus digest is reproducible across runs.
    entries.sort_by_key(|e| e.file_name());

    let mut cases = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            continue;
        }
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        cases.push(TestCase {
            id,
            files: vec![path],
            expectation: Expectation::ExitCode(0),
        });
    }
    Ok(cases)
}

fn ensure_unique_ids(cases: &[TestCase]) -> Result<()> {
    let mut seen = HashSet::new();
    for case in cases {
        if !seen.insert(case.id.as_str()) {
            return Err(HarnessError::Corpus(format!(
                "duplicate test case id `{}`",
                case.id
            )));
        }
    }
    Ok(())
}

/// Digest over the ordered case ids, identifying this corpus selection.
pub fn corpus_digest(cases: &[TestCase]) -> String {
    let mut hasher = Sha256::new();
    for case in cases {
        hasher.update(case.id.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus_with(manifest: &str, sources: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        if !manifest.is_empty() {
            fs::write(dir.path().join(MANIFEST_NAME), manifest).expect("write manifest");
        }
        for name in sources {
            fs::write(dir.path().join(name), "fn main() {}\n").expect("write source");
        }
        dir
    }

    #[test]
    fn test_manifest_cases_are_loaded() {
        let dir = corpus_with(
            r#"[
                {"id": "ret-zero", "files": ["ret_zero.csc"], "expected_exit_code": 0},
                {"id": "bad-parse", "files": ["bad_parse.csc"], "expected_diagnostics": [101]},
                {"id": "defaulted", "files": ["defaulted.csc"]}
            ]"#,
            &["ret_zero.csc", "bad_parse.csc", "defaulted.csc"],
        );

        let cases = load_corpus(dir.path()).expect("load");
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].expectation, Expectation::ExitCode(0));
        assert_eq!(cases[1].expectation, Expectation::Diagnostics(vec![101]));
        assert_eq!(cases[2].expectation, Expectation::ExitCode(0));
        assert!(cases[0].files[0].starts_with(dir.path()));
    }

    #[test]
    fn test_manifest_rejects_conflicting_expectations() {
        let dir = corpus_with(
            r#"[{"id": "both", "files": ["a.csc"], "expected_exit_code": 0, "expected_diagnostics": [1]}]"#,
            &["a.csc"],
        );
        let err = load_corpus(dir.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Corpus(_)));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let dir = corpus_with(
            r#"[
                {"id": "dup", "files": ["a.csc"]},
                {"id": "dup", "files": ["b.csc"]}
            ]"#,
            &["a.csc", "b.csc"],
        );
        let err = load_corpus(dir.path()).unwrap_err();
        assert!(matches!(err, HarnessError::Corpus(_)));
    }

    #[test]
    fn test_directory_scan_defaults_to_exit_zero() {
        let dir = corpus_with("", &["zeta.csc", "alpha.csc", "notes.txt"]);
        let cases = load_corpus(dir.path()).expect("load");
        assert_eq!(cases.len(), 2);
        // Sorted scan order.
        assert_eq!(cases[0].id, "alpha");
        assert_eq!(cases[1].id, "zeta");
        assert!(cases.iter().all(|c| c.expectation == Expectation::ExitCode(0)));
    }

    #[test]
    fn test_corpus_digest_is_order_sensitive_and_stable() {
        let a = TestCase {
            id: "a".to_string(),
            files: vec![],
            expectation: Expectation::ExitCode(0),
        };
        let b = TestCase {
            id: "b".to_string(),
            files: vec![],
            expectation: Expectation::ExitCode(0),
        };

        let ab = corpus_digest(&[a.clone(), b.clone()]);
        let ab2 = corpus_digest(&[a.clone(), b.clone()]);
        let ba = corpus_digest(&[b, a]);
        assert_eq!(ab, ab2);
        assert_ne!(ab, ba);
    }
}
