// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Distills a completed agent's Markdown output into a structured context.
//!
//! Agents whose output feeds a downstream agent are prompted to end with a
//! fixed set of `## ` sections.  The parser here is deliberately lenient:
//! missing sections are fine, heading case is preserved as written, and the
//! raw output is always kept as the escape hatch.  The distilled context —
//! not the raw output — is what travels forward in a pipeline; that is the
//! primary token-economy mechanism.

use regex::Regex;
use serde::Serialize;

use flotilla_core::AgentRole;

/// Pass/fail information harvested from TESTER output.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TestResults {
    pub passed: Option<u64>,
    pub failed: Option<u64>,
    /// The raw `FAILED …` block, when one was found.
    pub failures: Option<String>,
}

impl TestResults {
    pub fn is_empty(&self) -> bool {
        self.passed.is_none() && self.failed.is_none() && self.failures.is_none()
    }

    fn format(&self) -> String {
        let mut parts = Vec::new();
        if let Some(p) = self.passed {
            parts.push(format!("Passed: {p}"));
        }
        if let Some(f) = self.failed {
            parts.push(format!("Failed: {f}"));
        }
        if let Some(details) = &self.failures {
            parts.push(format!("\nFailure Details:\n{details}"));
        }
        parts.join("\n")
    }
}

/// Structured context extracted from one agent's output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentContext {
    pub summary: String,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub key_findings: Vec<String>,
    pub recommendations: String,
    pub test_results: Option<TestResults>,
    pub errors: Vec<String>,
    pub requires_fix: bool,
    /// The agent's complete raw output, kept for rollback and debugging.
    pub full_output: String,
}

impl AgentContext {
    /// Minimal context to pass to the next agent in a sequential pipeline:
    /// summary, file manifests, findings, and recommendations — nothing else.
    pub fn forward_context(&self) -> String {
        let mut parts = Vec::new();

        if !self.summary.is_empty() {
            parts.push(format!("## Previous Agent Summary\n{}", self.summary));
        }
        if !self.files_created.is_empty() {
            parts.push(format!("\n## Files Created\n{}", bullets(&self.files_created)));
        }
        if !self.files_modified.is_empty() {
            parts.push(format!("\n## Files Modified\n{}", bullets(&self.files_modified)));
        }
        if !self.key_findings.is_empty() {
            parts.push(format!("\n## Key Findings\n{}", bullets(&self.key_findings)));
        }
        if !self.recommendations.is_empty() {
            parts.push(format!("\n## Recommendations\n{}", self.recommendations));
        }

        parts.join("\n")
    }

    /// Detailed context for fixing a failure: adds errors, test results, and
    /// the first 1,000 characters of the raw output.
    pub fn error_context(&self) -> String {
        let mut parts = vec![format!("## Previous Agent Summary\n{}", self.summary)];

        if !self.errors.is_empty() {
            parts.push(format!("\n## Errors Found\n{}", bullets(&self.errors)));
        }
        if let Some(results) = &self.test_results {
            parts.push(format!("\n## Test Results\n{}", results.format()));
        }
        if !self.full_output.is_empty() && self.requires_fix {
            let cut = floor_char_boundary(&self.full_output, 1_000);
            parts.push(format!("\n## Additional Details\n{}", &self.full_output[..cut]));
        }

        parts.join("\n")
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut i = max.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Extract structured information from an agent's output.
pub fn distill(output: &str, role: AgentRole) -> AgentContext {
    let mut context = AgentContext {
        full_output: output.to_string(),
        ..Default::default()
    };

    for (heading, body) in sections(output) {
        match heading {
            "Summary" => context.summary = body.trim().to_string(),
            "Files Created" | "Documentation Files Created" | "Test Files Created" => {
                context.files_created = bullet_list(&body)
            }
            "Files Modified" => context.files_modified = bullet_list(&body),
            "Key Findings" => context.key_findings = bullet_list(&body),
            "Recommendations for Next Agent" | "For Next Agent" => {
                context.recommendations = body.trim().to_string()
            }
            _ => {}
        }
    }

    match role {
        AgentRole::Tester => {
            let results = test_results(output);
            context.requires_fix = results
                .as_ref()
                .and_then(|r| r.failed)
                .map_or(false, |failed| failed > 0);
            context.test_results = results;
            if context.requires_fix {
                context.errors = test_errors(output);
            }
        }
        AgentRole::Reviewer => {
            context.requires_fix = has_review_issues(output);
            if context.requires_fix {
                context.errors = review_issues(output);
            }
        }
        _ => {}
    }

    context
}

// ─── Section scanning ─────────────────────────────────────────────────────────

/// Split the output into `## ` sections.  Headings keep their written case;
/// trailing whitespace on the heading line is tolerated.  Text before the
/// first heading is ignored.
fn sections(text: &str) -> Vec<(&str, String)> {
    let mut result: Vec<(&str, String)> = Vec::new();
    let mut current: Option<(&str, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some((h, body)) = current.take() {
                result.push((h, body.join("\n")));
            }
            current = Some((heading.trim_end(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((h, body)) = current.take() {
        result.push((h, body.join("\n")));
    }
    result
}

/// Items of a `- ` bullet list, trimmed, empties dropped.
fn bullet_list(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.trim().strip_prefix("- "))
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

// ─── TESTER extraction ────────────────────────────────────────────────────────

fn test_results(output: &str) -> Option<TestResults> {
    let passed_re = Regex::new(r"(\d+) passed").unwrap();
    let failed_re = Regex::new(r"(\d+) failed").unwrap();

    let mut results = TestResults {
        passed: passed_re
            .captures(output)
            .and_then(|c| c[1].parse().ok()),
        failed: failed_re
            .captures(output)
            .and_then(|c| c[1].parse().ok()),
        failures: None,
    };
    results.failures = failures_block(output);

    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}

/// The text from the first `FAILED` marker up to (not including) the next
/// line starting with `PASSED` or `=====`, or the end of the output.
fn failures_block(output: &str) -> Option<String> {
    let start = output.find("FAILED")?;
    let tail = &output[start..];

    let mut block_len = 0;
    for (i, line) in tail.lines().enumerate() {
        if i > 0 && (line.starts_with("PASSED") || line.starts_with("=====")) {
            break;
        }
        block_len += line.len() + 1; // +1 for the newline
    }
    let end = block_len.saturating_sub(1).min(tail.len());
    Some(tail[..end].to_string())
}

/// Up to five error lines matching the common assertion/exception shapes.
fn test_errors(output: &str) -> Vec<String> {
    let patterns = [
        r"AssertionError: ([^\n]*)",
        r"\bError: ([^\n]*)",
        r"Exception: ([^\n]*)",
    ];
    let mut errors = Vec::new();
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap();
        for captures in re.captures_iter(output) {
            errors.push(captures[1].trim().to_string());
        }
    }
    errors.truncate(5);
    errors
}

// ─── REVIEWER extraction ──────────────────────────────────────────────────────

const REVIEW_ISSUE_INDICATORS: [&str; 6] = [
    "does not meet",
    "missing",
    "issues found",
    "problems",
    "incorrect",
    "needs revision",
];

fn has_review_issues(output: &str) -> bool {
    let lower = output.to_lowercase();
    REVIEW_ISSUE_INDICATORS.iter().any(|i| lower.contains(i))
}

fn review_issues(output: &str) -> Vec<String> {
    sections(output)
        .into_iter()
        .find(|(heading, _)| *heading == "Issues")
        .map(|(_, body)| bullet_list(&body))
        .unwrap_or_default()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const TESTER_OUTPUT: &str = "\
Ran the suite.

## Summary
All green.

## Test Files Created
- tests/a.py
- tests/b.py

## For Next Agent
Proceed.

noise line 1
noise line 2";

    // ── Section parsing ───────────────────────────────────────────────────────

    #[test]
    fn extracts_summary_and_file_variants() {
        let ctx = distill(TESTER_OUTPUT, AgentRole::Tester);
        assert_eq!(ctx.summary, "All green.");
        assert_eq!(ctx.files_created, vec!["tests/a.py", "tests/b.py"]);
        assert_eq!(ctx.recommendations, "Proceed.");
    }

    #[test]
    fn forward_context_carries_only_distilled_sections() {
        let ctx = distill(TESTER_OUTPUT, AgentRole::Tester);
        let fwd = ctx.forward_context();
        assert!(fwd.contains("## Previous Agent Summary"));
        assert!(fwd.contains("All green."));
        assert!(fwd.contains("- tests/a.py"));
        assert!(fwd.contains("Proceed."));
        // The raw output is not forwarded.
        assert!(!fwd.contains("noise line"));
        assert!(!fwd.contains("Ran the suite."));
    }

    #[test]
    fn missing_sections_yield_empty_fields() {
        let ctx = distill("free-form text with no headings", AgentRole::Builder);
        assert!(ctx.summary.is_empty());
        assert!(ctx.files_created.is_empty());
        assert!(ctx.forward_context().is_empty());
        assert_eq!(ctx.full_output, "free-form text with no headings");
    }

    #[test]
    fn heading_with_trailing_whitespace_is_tolerated() {
        let out = "## Summary   \nDone.\n";
        let ctx = distill(out, AgentRole::Builder);
        assert_eq!(ctx.summary, "Done.");
    }

    #[test]
    fn heading_case_is_not_normalised() {
        // `## summary` (lowercase) is a different heading and must not match.
        let ctx = distill("## summary\nlowercase\n", AgentRole::Builder);
        assert!(ctx.summary.is_empty());
    }

    #[test]
    fn files_modified_and_key_findings_parse_as_bullets() {
        let out = "## Files Modified\n- src/a.rs\nnot a bullet\n- src/b.rs\n\n## Key Findings\n- finding one\n";
        let ctx = distill(out, AgentRole::Analyst);
        assert_eq!(ctx.files_modified, vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(ctx.key_findings, vec!["finding one"]);
    }

    // ── TESTER extraction ─────────────────────────────────────────────────────

    #[test]
    fn tester_pass_fail_counts_are_parsed() {
        let out = "## Summary\nRan tests.\n\n12 passed, 3 failed in 1.2s";
        let ctx = distill(out, AgentRole::Tester);
        let results = ctx.test_results.unwrap();
        assert_eq!(results.passed, Some(12));
        assert_eq!(results.failed, Some(3));
        assert!(ctx.requires_fix);
    }

    #[test]
    fn tester_all_passing_does_not_require_fix() {
        let out = "5 passed in 0.3s";
        let ctx = distill(out, AgentRole::Tester);
        assert!(!ctx.requires_fix);
        assert_eq!(ctx.test_results.unwrap().passed, Some(5));
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn tester_failures_block_stops_at_passed_line() {
        let out = "1 failed\nFAILED tests/test_x.py::test_a - AssertionError: wrong value\n  detail line\nPASSED tests/test_y.py\n";
        let ctx = distill(out, AgentRole::Tester);
        let failures = ctx.test_results.unwrap().failures.unwrap();
        assert!(failures.contains("FAILED tests/test_x.py"));
        assert!(failures.contains("detail line"));
        assert!(!failures.contains("PASSED"));
    }

    #[test]
    fn tester_harvests_at_most_five_errors() {
        let mut out = String::from("9 failed\n");
        for i in 0..9 {
            out.push_str(&format!("AssertionError: case {i}\n"));
        }
        let ctx = distill(&out, AgentRole::Tester);
        assert_eq!(ctx.errors.len(), 5);
        assert_eq!(ctx.errors[0], "case 0");
    }

    #[test]
    fn error_pattern_does_not_double_count_assertion_errors() {
        let out = "1 failed\nAssertionError: the real one\n";
        let ctx = distill(out, AgentRole::Tester);
        assert_eq!(ctx.errors, vec!["the real one"]);
    }

    #[test]
    fn non_tester_roles_skip_test_extraction() {
        let out = "3 failed";
        let ctx = distill(out, AgentRole::Builder);
        assert!(ctx.test_results.is_none());
        assert!(!ctx.requires_fix);
    }

    // ── REVIEWER extraction ───────────────────────────────────────────────────

    #[test]
    fn reviewer_indicator_sets_requires_fix() {
        let out = "The implementation Does Not Meet the stated requirements.\n\n## Issues\n- null handling is incorrect\n- tests missing for edge cases\n";
        let ctx = distill(out, AgentRole::Reviewer);
        assert!(ctx.requires_fix);
        assert_eq!(
            ctx.errors,
            vec!["null handling is incorrect", "tests missing for edge cases"]
        );
    }

    #[test]
    fn clean_review_passes() {
        let out = "## Summary\nLooks good, approved.";
        let ctx = distill(out, AgentRole::Reviewer);
        assert!(!ctx.requires_fix);
        assert!(ctx.errors.is_empty());
    }

    // ── Error context ─────────────────────────────────────────────────────────

    #[test]
    fn error_context_includes_truncated_output() {
        let mut out = String::from("2 failed\nAssertionError: nope\n## Summary\nBroken.\n");
        out.push_str(&"x".repeat(3_000));
        let ctx = distill(&out, AgentRole::Tester);
        let err = ctx.error_context();
        assert!(err.contains("## Errors Found"));
        assert!(err.contains("- nope"));
        assert!(err.contains("## Test Results"));
        assert!(err.contains("## Additional Details"));
        // Additional details carry at most 1,000 chars of raw output.
        let details = err.split("## Additional Details\n").nth(1).unwrap();
        assert!(details.len() <= 1_000);
    }
}
