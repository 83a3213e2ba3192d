//! Weighted scoring engine.
//!
//! Four component scores (syntax, security, quality, critique) compose into
//! an overall score via a per-validator weight table. The table is a static
//! exhaustive match so adding a validator type without weights fails to
//! compile.

use std::collections::BTreeMap;

use crate::domain::models::validation::{Issue, SecurityFinding, Severity};

/// Pass threshold on the overall score.
pub const PASS_THRESHOLD: u8 = 70;
/// Extra penalty applied when any critical security finding is present.
pub const CRITICAL_PENALTY: u32 = 20;

/// Which validator profile scores an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidatorType {
    Universal,
    Static,
    Security,
    Deployment,
}

impl ValidatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Universal => "universal",
            Self::Static => "static",
            Self::Security => "security",
            Self::Deployment => "deployment",
        }
    }
}

/// Score components referenced by the weight tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScoreComponent {
    Syntax,
    Security,
    Quality,
    Critique,
}

impl ScoreComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Security => "security",
            Self::Quality => "quality",
            Self::Critique => "critique",
        }
    }
}

/// Per-validator component weights. Components absent from a profile carry
/// no weight; the deployment critique slot covers perf/reliability/scale.
pub fn weights(validator: ValidatorType) -> &'static [(ScoreComponent, f64)] {
    match validator {
        ValidatorType::Universal => &[
            (ScoreComponent::Syntax, 0.25),
            (ScoreComponent::Security, 0.30),
            (ScoreComponent::Quality, 0.25),
            (ScoreComponent::Critique, 0.20),
        ],
        ValidatorType::Static => &[
            (ScoreComponent::Syntax, 0.40),
            (ScoreComponent::Quality, 0.35),
            (ScoreComponent::Critique, 0.25),
        ],
        ValidatorType::Security => &[(ScoreComponent::Security, 0.80)],
        ValidatorType::Deployment => &[
            (ScoreComponent::Security, 0.25),
            (ScoreComponent::Quality, 0.20),
            (ScoreComponent::Critique, 0.55),
        ],
    }
}

/// Fast-mode weights: heuristic security and quality only.
pub fn fast_weights() -> &'static [(ScoreComponent, f64)] {
    &[
        (ScoreComponent::Security, 0.40),
        (ScoreComponent::Quality, 0.60),
    ]
}

/// Compose component scores into the overall score and the pass decision.
///
/// Overall = Σ weight·score, rounded, minus the critical penalty, clamped
/// to [0, 100]. Passed ⇔ overall ≥ 70 and no critical finding.
pub fn compose(
    table: &[(ScoreComponent, f64)],
    scores: &BTreeMap<ScoreComponent, u8>,
    has_critical_finding: bool,
) -> (u8, bool) {
    let weighted: f64 = table
        .iter()
        .map(|(component, weight)| {
            let score = scores.get(component).copied().unwrap_or(0);
            f64::from(score) * weight
        })
        .sum();

    let mut overall = weighted.round();
    if has_critical_finding {
        overall -= f64::from(CRITICAL_PENALTY);
    }
    let overall = overall.clamp(0.0, 100.0) as u8;
    let passed = overall >= PASS_THRESHOLD && !has_critical_finding;
    (overall, passed)
}

/// Apply severity penalties to a base-100 score, floored at 0.
pub fn penalized_score<'a, I: IntoIterator<Item = &'a Severity>>(severities: I) -> u8 {
    let penalty: u32 = severities.into_iter().map(Severity::penalty).sum();
    100u32.saturating_sub(penalty).min(100) as u8
}

pub fn score_from_issues(issues: &[Issue]) -> u8 {
    penalized_score(issues.iter().map(|i| &i.severity))
}

pub fn score_from_findings(findings: &[SecurityFinding]) -> u8 {
    penalized_score(findings.iter().map(|f| &f.severity))
}

/// Heuristic quality score for fast mode: keyword presence and control-flow
/// counts, no LLM involved.
pub fn heuristic_quality(content: &str) -> u8 {
    if content.trim().is_empty() {
        return 0;
    }
    let mut score: u32 = 50;

    let has_any = |needles: &[&str]| needles.iter().any(|n| content.contains(n));

    // Structural keywords.
    if has_any(&["package ", "mod ", "module ", "import ", "use "]) {
        score += 10;
    }
    if has_any(&["func ", "fn ", "def ", "function ", "class "]) {
        score += 15;
    }
    // Control flow density.
    let control_flow = ["if ", "for ", "while ", "switch ", "match "]
        .iter()
        .map(|kw| content.matches(kw).count())
        .sum::<usize>();
    if control_flow > 0 {
        score += 10;
    }
    // Error handling.
    if has_any(&["err", "Result", "try", "catch", "except", "raise"]) {
        score += 10;
    }
    // Commentary.
    if has_any(&["//", "# ", "/*", "\"\"\""]) {
        score += 5;
    }

    score.min(100) as u8
}

/// Heuristic security score for fast mode: forbidden-token presence only.
pub fn heuristic_security(content: &str) -> u8 {
    let lowered = content.to_lowercase();
    let forbidden = [
        "password =",
        "password=",
        "api_key =",
        "api_key=",
        "secret =",
        "secret=",
        "eval(",
        "exec(",
        "-----begin rsa private key-----",
        "shell=true",
    ];
    let hits = forbidden.iter().filter(|t| lowered.contains(*t)).count() as u32;
    100u32.saturating_sub(hits * 25).min(100) as u8
}
