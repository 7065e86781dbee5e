//! Error types and the aggregate driver issue log.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host::HostError;

/// Data-integrity failures that abort the current build step.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BuildError {
    /// Stack did not reduce to one value, underflowed, or got a bad knot count
    #[error("malformed formula for {output}: {reason}")]
    MalformedFormula { output: String, reason: String },

    /// Operation tag outside the supported set
    #[error("unknown formula operation '{op}' in formula for {output}")]
    UnknownOperation { output: String, op: String },

    /// Stage formulas reference each other in a loop
    #[error("cyclic formula graph: {}", chain.join(" -> "))]
    CyclicFormulaGraph { chain: Vec<String> },

    /// Bone parent links form a loop
    #[error("bone hierarchy cycle in figure {figure} involving {bones:?}")]
    BoneHierarchyCycle { figure: String, bones: Vec<String> },

    #[error("no figure at index {0}")]
    UnknownFigure(usize),

    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Recoverable driver problems collected during a build and reported once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DriverIssueKind {
    /// Expression text exceeded the host budget and was cut
    ExpressionOverflow,
    /// No single-letter variable names left on the target driver
    VariablesExhausted,
}

impl fmt::Display for DriverIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverIssueKind::ExpressionOverflow => f.write_str("expression too long"),
            DriverIssueKind::VariablesExhausted => f.write_str("too many driver variables"),
        }
    }
}

/// Issues recorded against one driven channel path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverIssue {
    pub kinds: BTreeSet<DriverIssueKind>,
    pub props: BTreeSet<String>,
    pub bones: BTreeSet<String>,
}

/// Aggregate error collection keyed by channel path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverErrorLog {
    entries: BTreeMap<String, DriverIssue>,
}

impl DriverErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<'a>(
        &mut self,
        path: impl Into<String>,
        kind: DriverIssueKind,
        props: impl IntoIterator<Item = &'a str>,
        bones: impl IntoIterator<Item = &'a str>,
    ) {
        let entry = self.entries.entry(path.into()).or_default();
        entry.kinds.insert(kind);
        entry.props.extend(props.into_iter().map(str::to_string));
        entry.bones.extend(bones.into_iter().map(str::to_string));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, path: &str) -> Option<&DriverIssue> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DriverIssue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn merge(&mut self, other: DriverErrorLog) {
        for (path, issue) in other.entries {
            let entry = self.entries.entry(path).or_default();
            entry.kinds.extend(issue.kinds);
            entry.props.extend(issue.props);
            entry.bones.extend(issue.bones);
        }
    }

    /// One line per channel path, in path order.
    pub fn report(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(path, issue)| {
                let kinds: Vec<String> = issue.kinds.iter().map(|k| k.to_string()).collect();
                let mut line = format!("{path}: {}", kinds.join(", "));
                if !issue.props.is_empty() {
                    let props: Vec<&str> = issue.props.iter().map(String::as_str).collect();
                    line.push_str(&format!("; props: {}", props.join(" ")));
                }
                if !issue.bones.is_empty() {
                    let bones: Vec<&str> = issue.bones.iter().map(String::as_str).collect();
                    line.push_str(&format!("; bones: {}", bones.join(" ")));
                }
                line
            })
            .collect()
    }

    /// Emit the aggregate report through `log`.
    pub fn log_report(&self) {
        if self.entries.is_empty() {
            return;
        }
        log::warn!("{} driven channels had driver problems:", self.entries.len());
        for line in self.report() {
            log::warn!("  {line}");
        }
    }
}
