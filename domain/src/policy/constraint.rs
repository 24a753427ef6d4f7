//! Constraint validation for proposed changes.
//!
//! Free-text goal constraints ("no new dependencies", "don't modify tests",
//! "keep changes under 50 lines") are matched against a small rule table.
//! Each matching entry yields a [`PolicyRule`] whose checker is run against
//! every [`Change`] a tool proposes.
//!
//! This is a heuristic. Phrasings the table does not recognise are reported
//! through [`ConstraintValidator::unrecognized`] and never enforced, and a
//! clean validation is not a guarantee that a change honours the goal. The
//! engine treats violations as advisory: they are logged and recorded on the
//! task result, but never block a task.

use crate::agent::value_objects::{Change, ChangeKind};
use regex::Regex;
use std::sync::LazyLock;

/// Change size used when a constraint asks for "small" changes without a number
pub const DEFAULT_SMALL_CHANGE_LINES: usize = 200;

const DEPENDENCY_MANIFESTS: &[&str] = &[
    "Cargo.toml",
    "Cargo.lock",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.mod",
    "go.sum",
    "requirements.txt",
    "pyproject.toml",
    "Pipfile",
    "Gemfile",
    "pom.xml",
    "build.gradle",
];

static DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:no|without|(?:don'?t|do not|never)\s+add)\s+(?:new\s+|extra\s+|additional\s+)?dependenc",
    )
    .expect("dependency pattern")
});

static TESTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?:don'?t|do not|never|no)\s+(?:modify|change|touch|edit)\w*\s+(?:the\s+|any\s+|existing\s+)?tests?)|(?:tests?\s+(?:are|is)\s+(?:read[- ]only|off[- ]limits))",
    )
    .expect("tests pattern")
});

static DELETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:no|(?:don'?t|do not|never))\s+delet").expect("delete pattern")
});

static READ_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bread[- ]?only\b").expect("read-only pattern"));

static SECRETS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"secret|credential|api[ _-]?key|password").expect("secrets pattern")
});

static MAX_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*lines?").expect("max lines pattern"));

static SMALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsmall\s+(?:changes?|diffs?|patch)").expect("small pattern"));

static ONLY_PATHS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"only\s+(?:modify|touch|change|edit)\s+(?:files\s+(?:in|under)\s+)?(.+)")
        .expect("only paths pattern")
});

static SECRET_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:(?:api[_-]?key|secret|password|passwd|token)\s*[:=]\s*["'][^"'\s]{8,}["'])|(?:AKIA[0-9A-Z]{16})|(?:-----BEGIN [A-Z ]*PRIVATE KEY-----)"#,
    )
    .expect("secret value pattern")
});

/// A policy check derived from one free-text constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRule {
    /// Dependency manifests must not change
    NoDependencyChanges,
    /// Paths that look like tests must not change
    ProtectTests,
    /// Files must not be deleted
    NoDeletions,
    /// Nothing may change at all
    ReadOnly,
    /// Added lines must not contain credential-looking values
    NoSecrets,
    /// A single change must stay within this many added + removed lines
    MaxChangeLines(usize),
    /// Changes must stay under one of these path prefixes
    RestrictPaths(Vec<String>),
}

impl PolicyRule {
    pub fn name(&self) -> &str {
        match self {
            PolicyRule::NoDependencyChanges => "no_dependency_changes",
            PolicyRule::ProtectTests => "protect_tests",
            PolicyRule::NoDeletions => "no_deletions",
            PolicyRule::ReadOnly => "read_only",
            PolicyRule::NoSecrets => "no_secrets",
            PolicyRule::MaxChangeLines(_) => "max_change_lines",
            PolicyRule::RestrictPaths(_) => "restrict_paths",
        }
    }

    /// Returns a violation message when `change` breaks this rule.
    pub fn check(&self, change: &Change) -> Option<String> {
        match self {
            PolicyRule::NoDependencyChanges => {
                let file = file_name(&change.path);
                DEPENDENCY_MANIFESTS
                    .contains(&file)
                    .then(|| format!("dependency manifest {} changed", change.path))
            }
            PolicyRule::ProtectTests => {
                is_test_path(&change.path).then(|| format!("test file {} changed", change.path))
            }
            PolicyRule::NoDeletions => (change.kind == ChangeKind::Delete)
                .then(|| format!("{} deleted", change.path)),
            PolicyRule::ReadOnly => Some(format!(
                "{} {} in a read-only run",
                change.path,
                change.kind.as_str()
            )),
            PolicyRule::NoSecrets => {
                let added = added_text(&change.diff);
                SECRET_VALUE_RE
                    .is_match(&added)
                    .then(|| format!("possible credential added to {}", change.path))
            }
            PolicyRule::MaxChangeLines(max) => (change.total_lines() > *max).then(|| {
                format!(
                    "{} changes {} lines (limit {})",
                    change.path,
                    change.total_lines(),
                    max
                )
            }),
            PolicyRule::RestrictPaths(prefixes) => {
                let path = change.path.trim_start_matches("./");
                (!prefixes.iter().any(|p| path.starts_with(p.as_str())))
                    .then(|| format!("{} is outside {}", change.path, prefixes.join(", ")))
            }
        }
    }
}

type RuleParser = fn(&str) -> Option<PolicyRule>;

/// Pattern -> rule table. Every parser sees the lowercased constraint text.
const RULE_TABLE: &[RuleParser] = &[
    |text| DEPENDENCY_RE.is_match(text).then_some(PolicyRule::NoDependencyChanges),
    |text| TESTS_RE.is_match(text).then_some(PolicyRule::ProtectTests),
    |text| DELETE_RE.is_match(text).then_some(PolicyRule::NoDeletions),
    |text| READ_ONLY_RE.is_match(text).then_some(PolicyRule::ReadOnly),
    |text| {
        (SECRETS_RE.is_match(text) && !text.contains("rotate")).then_some(PolicyRule::NoSecrets)
    },
    parse_max_lines,
    parse_only_paths,
];

fn parse_max_lines(text: &str) -> Option<PolicyRule> {
    if let Some(caps) = MAX_LINES_RE.captures(text)
        && (text.contains("max")
            || text.contains("under")
            || text.contains("at most")
            || text.contains("less than")
            || text.contains("fewer than")
            || text.contains("limit"))
    {
        return caps[1].parse().ok().map(PolicyRule::MaxChangeLines);
    }
    SMALL_RE
        .is_match(text)
        .then_some(PolicyRule::MaxChangeLines(DEFAULT_SMALL_CHANGE_LINES))
}

fn parse_only_paths(text: &str) -> Option<PolicyRule> {
    let caps = ONLY_PATHS_RE.captures(text)?;
    let prefixes: Vec<String> = caps[1]
        .split([',', ' '])
        .map(|p| p.trim().trim_matches(['"', '\'', '`', '.']).trim_start_matches("./"))
        .filter(|p| !p.is_empty() && *p != "and" && *p != "or")
        .map(str::to_string)
        .collect();
    (!prefixes.is_empty()).then_some(PolicyRule::RestrictPaths(prefixes))
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let file = file_name(&lower);
    lower.split(['/', '\\']).any(|seg| seg == "tests" || seg == "test" || seg == "__tests__")
        || file.starts_with("test_")
        || file.contains("_test.")
        || file.contains(".test.")
        || file.contains(".spec.")
}

/// Lines added by a diff; the whole text when it carries no diff markers.
fn added_text(diff: &str) -> String {
    let has_markers = diff.lines().any(|l| l.starts_with('+') || l.starts_with('-'));
    if !has_markers {
        return diff.to_string();
    }
    diff.lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .map(|l| &l[1..])
        .collect::<Vec<_>>()
        .join("\n")
}

/// One free-text constraint and the rules it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub text: String,
    pub rules: Vec<PolicyRule>,
}

/// A change that breaks a constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The constraint text as the user wrote it
    pub constraint: String,
    pub rule: String,
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.constraint, self.rule, self.message)
    }
}

/// Evaluates proposed changes against constraints parsed from goal text.
#[derive(Debug, Clone, Default)]
pub struct ConstraintValidator {
    constraints: Vec<Constraint>,
    unrecognized: Vec<String>,
}

impl ConstraintValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_constraints<S: AsRef<str>>(constraints: &[S]) -> Self {
        let mut validator = Self::new();
        for text in constraints {
            validator.add(text.as_ref());
        }
        validator
    }

    /// Parses one constraint. Text no rule recognises is kept aside.
    pub fn add(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let lower = text.to_lowercase();
        let rules: Vec<PolicyRule> = RULE_TABLE.iter().filter_map(|parse| parse(&lower)).collect();
        if rules.is_empty() {
            self.unrecognized.push(text.to_string());
        } else {
            self.constraints.push(Constraint {
                text: text.to_string(),
                rules,
            });
        }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Constraints no rule matched; these are not enforced.
    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn validate(&self, changes: &[Change]) -> Vec<Violation> {
        let mut violations = Vec::new();
        for change in changes {
            for constraint in &self.constraints {
                for rule in &constraint.rules {
                    if let Some(message) = rule.check(change) {
                        violations.push(Violation {
                            constraint: constraint.text.clone(),
                            rule: rule.name().to_string(),
                            path: change.path.clone(),
                            message,
                        });
                    }
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modify(path: &str) -> Change {
        Change::new(path, ChangeKind::Modify)
    }

    #[test]
    fn test_rule_parsing() {
        let validator = ConstraintValidator::from_constraints(&[
            "No new dependencies",
            "Don't modify the tests",
            "keep changes under 40 lines",
            "be nice",
        ]);

        let rules: Vec<&PolicyRule> = validator
            .constraints()
            .iter()
            .flat_map(|c| c.rules.iter())
            .collect();
        assert!(rules.contains(&&PolicyRule::NoDependencyChanges));
        assert!(rules.contains(&&PolicyRule::ProtectTests));
        assert!(rules.contains(&&PolicyRule::MaxChangeLines(40)));
        assert_eq!(validator.unrecognized(), &["be nice".to_string()]);
    }

    #[test]
    fn test_dependency_rule() {
        let validator = ConstraintValidator::from_constraints(&["do not add dependencies"]);
        let violations = validator.validate(&[modify("Cargo.toml"), modify("src/main.rs")]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "Cargo.toml");
        assert_eq!(violations[0].rule, "no_dependency_changes");
    }

    #[test]
    fn test_protect_tests_rule() {
        let validator = ConstraintValidator::from_constraints(&["never touch existing tests"]);
        let violations = validator.validate(&[
            modify("tests/api.rs"),
            modify("web/app.test.ts"),
            modify("src/test_utils_helper.rs"),
            modify("src/lib.rs"),
        ]);
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["tests/api.rs", "web/app.test.ts"]);
    }

    #[test]
    fn test_no_deletions_and_read_only() {
        let validator = ConstraintValidator::from_constraints(&["don't delete files"]);
        let deleted = Change::new("old.rs", ChangeKind::Delete);
        assert_eq!(validator.validate(&[deleted.clone(), modify("a.rs")]).len(), 1);

        let read_only =
            ConstraintValidator::from_constraints(&["this is a read-only investigation"]);
        assert_eq!(read_only.validate(&[modify("a.rs")]).len(), 1);
    }

    #[test]
    fn test_secret_rule_only_checks_added_lines() {
        let validator = ConstraintValidator::from_constraints(&["no secrets in code"]);
        let leaked = modify("config.rs").with_diff("+let api_key = \"sk_live_abcdef123456\";");
        let removed = modify("config.rs").with_diff("-let api_key = \"sk_live_abcdef123456\";");

        assert_eq!(validator.validate(&[leaked]).len(), 1);
        assert!(validator.validate(&[removed]).is_empty());
    }

    #[test]
    fn test_max_lines_rule() {
        let validator = ConstraintValidator::from_constraints(&["at most 2 lines per change"]);
        let big = modify("a.rs").with_diff("+a\n+b\n+c");
        let small = modify("b.rs").with_diff("+a");
        let violations = validator.validate(&[big, small]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("limit 2"));
    }

    #[test]
    fn test_small_changes_uses_default_limit() {
        let validator = ConstraintValidator::from_constraints(&["prefer small changes"]);
        assert_eq!(
            validator.constraints()[0].rules,
            vec![PolicyRule::MaxChangeLines(DEFAULT_SMALL_CHANGE_LINES)]
        );
    }

    #[test]
    fn test_restrict_paths_rule() {
        let validator = ConstraintValidator::from_constraints(&["only modify src/api, docs"]);
        let violations = validator.validate(&[
            modify("src/api/handler.rs"),
            modify("./docs/guide.md"),
            modify("src/db/pool.rs"),
        ]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "src/db/pool.rs");
    }

    #[test]
    fn test_empty_validator_accepts_everything() {
        let validator = ConstraintValidator::new();
        assert!(validator.is_empty());
        assert!(validator.validate(&[modify("Cargo.toml")]).is_empty());
    }
}
