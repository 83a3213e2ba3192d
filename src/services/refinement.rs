//! Refinement prompt construction.
//!
//! Between validation cycles the engine asks the LLM to rewrite the artifact
//! content, listing every issue with its severity, location and suggestion.

use crate::domain::models::validation::{Issue, SecurityFinding};

/// Build the rewrite prompt for one refinement cycle.
pub fn build_prompt(
    issues: &[Issue],
    findings: &[SecurityFinding],
    content: &str,
) -> String {
    let mut listing = String::new();
    let mut index = 1usize;

    for finding in findings {
        listing.push_str(&format!(
            "{index}. [{severity}] {title} ({file}:{line}:{column})\n   Fix: {fix}\n",
            severity = finding.severity,
            title = finding.description,
            file = finding.location.file,
            line = finding.location.line,
            column = finding.location.column,
            fix = finding.recommendation,
        ));
        index += 1;
    }
    for issue in issues {
        listing.push_str(&format!(
            "{index}. [{severity}] {title} ({file}:{line}:{column})\n   Fix: {fix}\n",
            severity = issue.severity,
            title = issue.title,
            file = issue.location.file,
            line = issue.location.line,
            column = issue.location.column,
            fix = issue.suggestion,
        ));
        index += 1;
    }

    format!(
        r"# Refinement Request

The content below failed validation. Fix every listed issue and return the
complete corrected content. Return only the content, no commentary.

## Issues

{listing}
## Current content

```
{content}
```
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::validation::{IssueLocation, Severity};

    #[test]
    fn test_prompt_lists_every_issue() {
        let issues = vec![Issue {
            rule_id: "GO-QUAL-002".to_string(),
            title: "panic in library code".to_string(),
            severity: Severity::Medium,
            category: "correctness".to_string(),
            location: IssueLocation {
                file: "main.go".to_string(),
                line: 12,
                column: 3,
            },
            suggestion: "Return an error instead of panicking".to_string(),
            confidence: 0.8,
        }];
        let findings = vec![SecurityFinding {
            rule_id: "GEN-SEC-001".to_string(),
            description: "Hardcoded password literal".to_string(),
            severity: Severity::High,
            location: IssueLocation {
                file: "main.go".to_string(),
                line: 4,
                column: 1,
            },
            recommendation: "Read credentials from the environment".to_string(),
        }];

        let prompt = build_prompt(&issues, &findings, "package main");

        assert!(prompt.contains("1. [high] Hardcoded password literal (main.go:4:1)"));
        assert!(prompt.contains("2. [medium] panic in library code (main.go:12:3)"));
        assert!(prompt.contains("package main"));
        assert!(prompt.contains("Return only the content"));
    }
}
