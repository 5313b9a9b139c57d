//! PLOPL Schema Linter CLI
//!
//! Validates capture schema files before they are handed to the capture
//! runtime.
//!
//! Usage:
//!   plopl-lint <directory_or_file> [OPTIONS]

use clap::{Parser, ValueEnum};
use plopl_lint::{collect_schema_files, lint_directory, lint_file, LintIssue, LintOptions, LintResult, Severity};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// PLOPL Schema Linter
#[derive(Parser, Debug)]
#[command(name = "plopl-lint")]
#[command(author, version, about = "Validate capture schema files")]
struct Args {
    /// Path to a schema file or a directory of schema files
    #[arg(required = true)]
    path: PathBuf,

    #[arg(short, long, value_enum, default_value = "text")]
    output: Output,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Also report informational findings
    #[arg(short, long)]
    verbose: bool,

    /// Strict mode - treat warnings as errors
    #[arg(short, long)]
    strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Text,
    Json,
}

fn main() {
    let args = Args::parse();
    let options = LintOptions {
        verbose: args.verbose,
    };

    if args.output == Output::Text {
        println!("{BOLD}{CYAN}PLOPL Schema Linter{RESET}");
        println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    }

    let file_count = collect_schema_files(&args.path).map(|f| f.len()).unwrap_or(0);
    if file_count == 0 && args.path.is_dir() {
        println!(
            "{YELLOW}Warning:{RESET} No JSON files found in {:?}",
            args.path
        );
        std::process::exit(0);
    }

    let result = if args.path.is_dir() {
        lint_directory(&args.path, &options)
    } else {
        lint_file(&args.path, &options)
    };

    match args.output {
        Output::Json => print_results_json(&result),
        Output::Text => {
            println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", args.path.display());
            println!("{DIM}Found:{RESET}    {BOLD}{}{RESET} schema file(s)", result.files_checked);
            print_results(&result, &args);
        }
    }

    let has_errors = result.errors > 0 || (args.strict && result.warnings > 0);
    std::process::exit(if has_errors { 1 } else { 0 });
}

fn print_results_json(result: &LintResult) {
    match serde_json::to_string_pretty(result) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("{RED}Failed to serialize results: {e}{RESET}");
            std::process::exit(2);
        }
    }
}

fn print_results(result: &LintResult, args: &Args) {
    println!();

    if result.issues.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    } else {
        let mut issues_by_file: BTreeMap<&Path, Vec<&LintIssue>> = BTreeMap::new();
        for issue in &result.issues {
            if args.errors_only && issue.severity != Severity::Error {
                continue;
            }
            issues_by_file.entry(issue.file.as_path()).or_default().push(issue);
        }

        for (file, issues) in issues_by_file {
            print_file_issues(file, &issues);
        }
    }

    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!("{BOLD}{CYAN}Summary{RESET}");
    println!("{DIM}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{RESET}");
    println!(
        "  {DIM}Files checked:{RESET} {BOLD}{}{RESET}",
        result.files_checked
    );

    if result.errors > 0 {
        println!("  {RED}Errors:{RESET}    {BOLD}{RED}{}{RESET}", result.errors);
    } else {
        println!("  {GREEN}Errors:{RESET}    {BOLD}{GREEN}0{RESET}");
    }
    if result.warnings > 0 {
        println!(
            "  {YELLOW}Warnings:{RESET}  {BOLD}{YELLOW}{}{RESET}",
            result.warnings
        );
    } else {
        println!("  {DIM}Warnings:{RESET}  {BOLD}0{RESET}");
    }

    println!();

    if result.errors == 0 && result.warnings == 0 {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if result.errors == 0 {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{RED}{BOLD}Linting failed with errors{RESET}");
    }
}

fn print_file_issues(file: &Path, issues: &[&LintIssue]) {
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let warnings = issues.iter().filter(|i| i.severity == Severity::Warning).count();
    let file_name = file.file_name().unwrap_or_default().to_string_lossy();

    let status = if errors > 0 {
        format!("{RED}FAIL{RESET}")
    } else if warnings > 0 {
        format!("{YELLOW}WARN{RESET}")
    } else {
        format!("{CYAN}INFO{RESET}")
    };
    println!("{status} {BOLD}{CYAN}{file_name}{RESET} {DIM}({errors} error(s), {warnings} warning(s)){RESET}");

    for issue in issues {
        let color = severity_color(issue.severity);
        let marker = format!("{color}|{RESET}");

        let location = issue
            .location
            .as_ref()
            .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
            .unwrap_or_default();
        let schema = issue
            .schema_id
            .as_ref()
            .map(|id| format!("{DIM}{id}:{RESET} "))
            .unwrap_or_default();

        println!(
            "  {marker} {schema}{location}{BOLD}{color}{}{RESET}: {} {DIM}({color}{}{DIM}){RESET}",
            issue.severity.label(),
            issue.message,
            issue.code
        );
        if let Some(suggestion) = &issue.suggestion {
            println!("  {marker}   {GREEN}-> {suggestion}{RESET}");
        }
    }
    println!();
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}
