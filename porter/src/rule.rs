//! Ordered rewrite rules.
//!
//! A rule maps a regular expression over the registry-host prefix of an
//! image reference to a replacement string. Rules are applied
//! successively, each on top of the previous rule's output, so the
//! order of a [`RuleSet`] is part of its meaning.

use std::borrow::Cow;
use std::cmp::Reverse;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Built-in rules, in declaration order.
pub const DEFAULT_RULES: &[(&str, &str)] = &[
    ("^gcr.io", ""),
    ("^docker.io", "docker"),
    ("^k8s.gcr.io", "google-containers"),
    ("^registry.k8s.io", "google-containers"),
    ("^quay.io", "quay"),
    ("^ghcr.io", "ghcr"),
];

/// Returns the built-in rules as an ordered mapping.
pub fn default_map() -> IndexMap<String, String> {
    DEFAULT_RULES
        .iter()
        .map(|(p, r)| ((*p).to_owned(), (*r).to_owned()))
        .collect()
}

/// Evaluation order of a rule set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum RuleOrder {
    /// Rules run in the order they were declared.
    #[default]
    Declaration,
    /// Longer patterns run first; equal lengths keep declaration order.
    LongestFirst,
}

/// A single pattern → replacement rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    replacement: String,
}

impl Rule {
    /// Compiles a rule.
    ///
    /// The replacement may refer to capture groups (`$1`, `${name}`) but
    /// must not contain a literal `.`: flattening turns every `/` into `.`
    /// and relies on dots never being introduced by rules.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        if replacement.contains('.') {
            return Err(Error::DottedReplacement {
                pattern: pattern.to_owned(),
                replacement: replacement.to_owned(),
            });
        }
        let compiled = Regex::new(pattern).map_err(|source| Error::InvalidRulePattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self {
            pattern: compiled,
            replacement: replacement.to_owned(),
        })
    }

    /// Returns the pattern source.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns the replacement string.
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replaces every match of the pattern in `input`.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(input, self.replacement.as_str())
    }
}

/// An ordered, immutable collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    order: RuleOrder,
}

impl RuleSet {
    /// Returns a rule set that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the built-in rule set.
    #[allow(clippy::expect_used)]
    pub fn defaults() -> Self {
        Self::from_pairs(DEFAULT_RULES.iter().copied(), RuleOrder::Declaration)
            .expect("built-in rules are valid")
    }

    /// Compiles a rule set from `(pattern, replacement)` pairs.
    ///
    /// A repeated pattern keeps the position of its first occurrence and
    /// the replacement of its last.
    pub fn from_pairs<P, R>(pairs: impl IntoIterator<Item = (P, R)>, order: RuleOrder) -> Result<Self>
    where
        P: Into<String>,
        R: Into<String>,
    {
        let map: IndexMap<String, String> = pairs
            .into_iter()
            .map(|(p, r)| (p.into(), r.into()))
            .collect();

        let mut rules = map
            .iter()
            .map(|(pattern, replacement)| Rule::new(pattern, replacement))
            .collect::<Result<Vec<_>>>()?;

        if order == RuleOrder::LongestFirst {
            rules.sort_by_key(|rule| Reverse(rule.pattern().len()));
        }
        Ok(Self { rules, order })
    }

    /// Returns the evaluation order this set was built with.
    pub const fn order(&self) -> RuleOrder {
        self.order
    }

    /// Returns `true` if the set contains no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Iterates the rules in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Returns the pattern sources in evaluation order.
    pub fn patterns(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::pattern).collect()
    }

    /// Applies every rule in order, each on the previous rule's output.
    pub fn apply(&self, input: &str) -> String {
        let mut current = input.to_owned();
        for rule in &self.rules {
            let next = rule.apply(&current);
            if let Cow::Owned(changed) = next {
                tracing::debug!(pattern = rule.pattern(), from = %current, to = %changed, "rule applied");
                current = changed;
            }
        }
        current
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
