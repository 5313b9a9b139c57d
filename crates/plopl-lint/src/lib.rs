//! Schema linting library for PLOPL capture schemas.
//!
//! Checks schema JSON files for problems the capture runtime would only
//! surface as log lines: malformed paths and conditions, field/expected
//! pairing mismatches, request sections that match everything or nothing.
//!
//! # Example
//!
//! ```no_run
//! use plopl_lint::{lint_directory, lint_file, LintOptions};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("schema.json"), &LintOptions::default());
//! let result = lint_directory(Path::new("./schemas"), &LintOptions::default());
//!
//! if result.has_errors() {
//!     eprintln!("Found {} errors", result.errors);
//! }
//! ```

mod types;
mod validator;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use types::{LintIssue, LintOptions, LintResult, Severity};
pub use validator::{check_rule, validate_schema};

/// Lint a single schema file.
pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    lint_file_with_id(path, options).0
}

fn lint_file_with_id(path: &Path, options: &LintOptions) -> (LintResult, Option<String>) {
    let mut result = LintResult::new();
    result.files_checked = 1;

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read file: {e}"),
                path,
            ));
            return (result, None);
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            result.add_issue(
                LintIssue::error("E002", format!("Invalid JSON: {e}"), path)
                    .with_suggestion("Check for JSON syntax errors"),
            );
            return (result, None);
        }
    };

    let id = validate_schema(path, &value, &mut result, options);
    (result, id)
}

/// Lint every `.json` file in a directory (non-recursive), then check that
/// schema ids are unique across them.
pub fn lint_directory(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();

    let files = match collect_schema_files(path) {
        Ok(files) => files,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read directory: {e}"),
                path,
            ));
            return result;
        }
    };

    let mut ids: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        let (file_result, id) = lint_file_with_id(&file, options);
        result.merge(file_result);
        if let Some(id) = id {
            ids.entry(id).or_default().push(file);
        }
    }
    check_duplicate_ids(&ids, &mut result);

    result
}

/// Lint a JSON string directly.
pub fn lint_json(json: &str, source_name: &str, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;

    let path = Path::new(source_name);
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) => {
            validate_schema(path, &value, &mut result, options);
        }
        Err(e) => result.add_issue(LintIssue::error("E002", format!("Invalid JSON: {e}"), path)),
    }
    result
}

/// Lint an already parsed schema document.
pub fn lint_value(value: &serde_json::Value, source_name: &str, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    validate_schema(Path::new(source_name), value, &mut result, options);
    result
}

/// Schema files under `path`: the file itself, or the `.json` files of a
/// directory, sorted.
pub fn collect_schema_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    } else {
        for entry in std::fs::read_dir(path)?.flatten() {
            let entry_path = entry.path();
            if entry_path.is_file() && entry_path.extension().is_some_and(|ext| ext == "json") {
                files.push(entry_path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn check_duplicate_ids(ids: &BTreeMap<String, Vec<PathBuf>>, result: &mut LintResult) {
    for (id, files) in ids {
        if files.len() < 2 {
            continue;
        }
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap_or_default().to_string_lossy().to_string())
            .collect();
        result.add_issue(
            LintIssue::error(
                "E020",
                format!("Schema id '{id}' is used by {} files: {}", files.len(), names.join(", ")),
                &files[0],
            )
            .with_schema(Some(id.as_str()))
            .with_location("id")
            .with_suggestion("Captured exchanges are keyed by schema id; give each schema its own"),
        );
    }
}
