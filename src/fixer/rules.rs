// src/fixer/rules.rs

//! Ordered error classification rules
//!
//! Each rule pairs an explicit matcher with the remediation it selects.
//! Rules are evaluated top-down and the first one that extracts something
//! wins.

use regex::Regex;
use std::sync::LazyLock;

static UNRESOLVABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"cannot resolve "([^"]+)", a dependency of "([^"]+)""#).unwrap()
});

static MISSING_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"could not find all required packages: ([\w\-\.\+ ]+)",
        r"target not found: ([\w\-\.\+ ]+)",
        r"error: ([\w\-\.\+]+): not found in",
        r"-> No AUR package found for ([\w\-\.\+]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const MIRROR_SYMPTOMS: &[&str] = &[
    "Operation too slow",
    "failed retrieving file",
    "failed to retrieve some files",
];

/// How a rule recognizes its error shape
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any of the substrings is present
    Contains(Vec<String>),
    /// Every match of every pattern, with its capture groups
    Patterns(Vec<Regex>),
}

impl Matcher {
    /// Capture groups of each hit; a substring hit has no groups
    pub fn find(&self, text: &str) -> Vec<Vec<String>> {
        match self {
            Matcher::Contains(needles) => {
                if needles.iter().any(|n| text.contains(n.as_str())) {
                    vec![Vec::new()]
                } else {
                    Vec::new()
                }
            }
            Matcher::Patterns(patterns) => patterns
                .iter()
                .flat_map(|re| re.captures_iter(text))
                .map(|caps| {
                    caps.iter()
                        .skip(1)
                        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Remediation {
    /// Re-rank mirrors
    ReselectMirrors,
    /// Exclude the dependent package (second capture) for the rest of the run
    IgnoreDependents,
    /// Install the named packages (first capture, whitespace separated)
    InstallMissing,
}

#[derive(Debug, Clone)]
pub struct ClassifierRule {
    pub matcher: Matcher,
    pub remediation: Remediation,
}

/// Unresolvable dependency: `dependency` of `parent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyBreak {
    pub dependency: String,
    pub parent: String,
}

/// The remediable error shape recognized in a failure text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    MirrorFailure,
    UnresolvableDependency(Vec<DependencyBreak>),
    MissingTargets(Vec<String>),
}

/// Top-down rule list
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassifierRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ErrorClassifier {
    pub fn builtin() -> Self {
        Self::new(vec![
            ClassifierRule {
                matcher: Matcher::Contains(MIRROR_SYMPTOMS.iter().map(|s| s.to_string()).collect()),
                remediation: Remediation::ReselectMirrors,
            },
            ClassifierRule {
                matcher: Matcher::Patterns(vec![UNRESOLVABLE_RE.clone()]),
                remediation: Remediation::IgnoreDependents,
            },
            ClassifierRule {
                matcher: Matcher::Patterns(MISSING_RES.clone()),
                remediation: Remediation::InstallMissing,
            },
        ])
    }

    pub fn new(rules: Vec<ClassifierRule>) -> Self {
        Self { rules }
    }

    /// The first rule that extracts something; `None` means not remediable
    pub fn classify(&self, text: &str) -> Option<Classification> {
        self.rules
            .iter()
            .find_map(|rule| build(rule.remediation, rule.matcher.find(text)))
    }
}

fn build(remediation: Remediation, hits: Vec<Vec<String>>) -> Option<Classification> {
    if hits.is_empty() {
        return None;
    }

    match remediation {
        Remediation::ReselectMirrors => Some(Classification::MirrorFailure),
        Remediation::IgnoreDependents => {
            let breaks: Vec<DependencyBreak> = hits
                .into_iter()
                .filter_map(|groups| {
                    let mut groups = groups.into_iter();
                    let dependency = groups.next()?;
                    let parent = groups.next().filter(|p| !p.is_empty())?;
                    Some(DependencyBreak { dependency, parent })
                })
                .collect();
            (!breaks.is_empty()).then_some(Classification::UnresolvableDependency(breaks))
        }
        Remediation::InstallMissing => {
            let mut packages: Vec<String> = Vec::new();
            for name in hits
                .iter()
                .filter_map(|groups| groups.first())
                .flat_map(|names| names.split_whitespace())
            {
                if !packages.iter().any(|p| p == name) {
                    packages.push(name.to_string());
                }
            }
            (!packages.is_empty()).then_some(Classification::MissingTargets(packages))
        }
    }
}
