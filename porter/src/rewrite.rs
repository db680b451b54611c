//! Rule-based reference rewriting.
//!
//! [`Rewriter::rewrite`] maps a source image reference to its mirror
//! reference:
//!
//! 1. references pinned by digest are rejected;
//! 2. every rule is applied in order on top of the previous output;
//! 3. a result equal to the source (ignoring ASCII case) means no rule
//!    recognized the registry;
//! 4. a leading `/` left by a stripped host is dropped and every other
//!    `/` becomes `.`, so the image fits a single-level namespace;
//! 5. the configured namespace, then registry host, are prepended;
//! 6. targets containing whitespace, or with a segment starting with `:`
//!    (such as a stripped host's port), are rejected.
//!
//! Every outcome is a [`RewriteResult`] value; rewriting never fails.

use std::fmt;

use crate::reference::{DIGEST_SEPARATOR, Reference};
use crate::rule::RuleSet;

/// Path separator in image references.
const SEPARATOR: char = '/';
/// Character that replaces [`SEPARATOR`] in flattened names.
const FLAT_SEPARATOR: char = '.';

/// Destination naming policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Target {
    /// Destination registry host (e.g., `registry.example.com`).
    pub registry: Option<String>,
    /// Destination namespace (e.g., a Docker Hub account).
    pub namespace: Option<String>,
}

impl Target {
    /// Creates a naming policy; empty strings count as unset.
    pub fn new(registry: Option<String>, namespace: Option<String>) -> Self {
        Self {
            registry: registry.filter(|s| !s.is_empty()),
            namespace: namespace.filter(|s| !s.is_empty()),
        }
    }

    /// Returns the prefix prepended to flattened names (`registry/namespace/`).
    fn prefix(&self) -> String {
        let mut prefix = String::new();
        for part in [&self.registry, &self.namespace].into_iter().flatten() {
            prefix.push_str(part);
            prefix.push(SEPARATOR);
        }
        prefix
    }
}

/// Why a reference was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Rejection {
    /// The reference is pinned by digest.
    DigestUnsupported,
    /// The reference is empty.
    EmptyReference,
    /// The rules produced something that is not an image reference.
    InvalidTarget(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DigestUnsupported => f.write_str("digest references unsupported"),
            Self::EmptyReference => f.write_str("empty image reference"),
            Self::InvalidTarget(target) => {
                write!(f, "rewritten reference `{target}` is not a valid image reference")
            }
        }
    }
}

/// Outcome of rewriting one reference.
///
/// Callers are expected to match every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum RewriteResult {
    /// The reference maps to `target`.
    Rewritten {
        /// The source reference.
        source: Reference,
        /// The mirror reference.
        target: Reference,
    },
    /// No rule changed the reference.
    NoMatch {
        /// The source reference string.
        source: String,
        /// Patterns of the rule set, in evaluation order.
        supported: Vec<String>,
    },
    /// The reference is not eligible for mirroring.
    Rejected {
        /// The source reference string.
        source: String,
        /// Why it was refused.
        reason: Rejection,
    },
}

impl RewriteResult {
    /// Returns the mirror reference, if the source was rewritten.
    pub const fn target(&self) -> Option<&Reference> {
        match self {
            Self::Rewritten { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Returns `true` for [`RewriteResult::Rewritten`].
    pub const fn is_rewritten(&self) -> bool {
        matches!(self, Self::Rewritten { .. })
    }
}

/// Rewrites source references with a fixed rule set and naming policy.
#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    rules: RuleSet,
    target: Target,
}

impl Rewriter {
    /// Creates a rewriter.
    pub const fn new(rules: RuleSet, target: Target) -> Self {
        Self { rules, target }
    }

    /// Returns the rule set.
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Returns the naming policy.
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Classifies and rewrites a source reference.
    pub fn rewrite(&self, source: &str) -> RewriteResult {
        let source = source.trim();
        let rejected = |reason| RewriteResult::Rejected {
            source: source.to_owned(),
            reason,
        };

        if source.is_empty() {
            return rejected(Rejection::EmptyReference);
        }
        if source.contains(DIGEST_SEPARATOR) {
            return rejected(Rejection::DigestUnsupported);
        }

        let substituted = self.rules.apply(source);
        if substituted.eq_ignore_ascii_case(source) {
            return RewriteResult::NoMatch {
                source: source.to_owned(),
                supported: self.rules.patterns().into_iter().map(str::to_owned).collect(),
            };
        }

        let flat = flatten(&substituted);
        if flat.is_empty() {
            return rejected(Rejection::InvalidTarget(substituted));
        }
        let target = format!("{}{flat}", self.target.prefix());
        if !is_well_formed(&target) {
            return rejected(Rejection::InvalidTarget(target));
        }

        match (Reference::parse(source), Reference::parse(&target)) {
            (Ok(src), Ok(dst)) => {
                tracing::debug!(source = %src, destination = %dst, "rewrote reference");
                RewriteResult::Rewritten {
                    source: src,
                    target: dst,
                }
            }
            (Err(_), _) => rejected(Rejection::EmptyReference),
            (_, Err(_)) => rejected(Rejection::InvalidTarget(target)),
        }
    }

    /// Recovers the pre-flattening form of a reference this rewriter
    /// produced, or `None` if `target` lacks the configured prefix.
    ///
    /// The result is the rules' output, not the original source: rules
    /// are not invertible in general.
    pub fn restore(&self, target: &str) -> Option<String> {
        let flat = target.trim().strip_prefix(self.target.prefix().as_str())?;
        if flat.is_empty() || flat.contains(SEPARATOR) {
            return None;
        }
        Some(unflatten(flat))
    }
}

/// Drops leading `/` and replaces every other `/` with `.`.
///
/// Interior empty segments are kept (`a//b` becomes `a..b`) so that
/// [`unflatten`] gives back the same path.
pub fn flatten(reference: &str) -> String {
    reference
        .trim_start_matches(SEPARATOR)
        .replace(SEPARATOR, &FLAT_SEPARATOR.to_string())
}

fn is_well_formed(target: &str) -> bool {
    !target.chars().any(char::is_whitespace)
        && !target.split(SEPARATOR).any(|segment| segment.starts_with(':'))
}

/// Replaces every `.` in the name with `/`, leaving the tag untouched.
///
/// The tag is the text after the last `:`.
pub fn unflatten(reference: &str) -> String {
    let (name, tag) = match reference.rsplit_once(':') {
        Some((name, tag)) => (name, Some(tag)),
        None => (reference, None),
    };
    let mut out = name.replace(FLAT_SEPARATOR, &SEPARATOR.to_string());
    if let Some(tag) = tag {
        out.push(':');
        out.push_str(tag);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::rule::RuleOrder;

    fn rules(pairs: &[(&str, &str)]) -> RuleSet {
        RuleSet::from_pairs(pairs.iter().copied(), RuleOrder::Declaration).unwrap()
    }

    fn target_of(result: &RewriteResult) -> String {
        match result {
            RewriteResult::Rewritten { target, .. } => target.to_string(),
            other => panic!("expected Rewritten, got {other:?}"),
        }
    }

    #[test]
    fn digest_is_rejected_regardless_of_rules() {
        for set in [RuleSet::defaults(), RuleSet::empty(), rules(&[("@", "at")])] {
            let rw = Rewriter::new(set, Target::default());
            assert_eq!(
                rw.rewrite("gcr.io/foo/bar@sha256:abcd"),
                RewriteResult::Rejected {
                    source: "gcr.io/foo/bar@sha256:abcd".into(),
                    reason: Rejection::DigestUnsupported,
                }
            );
        }
    }

    #[test]
    fn unknown_registry_is_no_match() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::default());
        match rw.rewrite("example.com/foo:v1") {
            RewriteResult::NoMatch { source, supported } => {
                assert_eq!(source, "example.com/foo:v1");
                assert_eq!(supported.len(), 6);
                assert_eq!(supported[0], "^gcr.io");
            }
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn empty_rule_set_never_matches() {
        let rw = Rewriter::new(RuleSet::empty(), Target::new(None, Some("mirror".into())));
        assert!(matches!(
            rw.rewrite("gcr.io/google-containers/pause:3.2"),
            RewriteResult::NoMatch { .. }
        ));
    }

    #[test]
    fn strips_host_and_flattens() {
        let rw = Rewriter::new(rules(&[("^gcr.io", "")]), Target::new(None, Some("mirror".into())));
        let result = rw.rewrite("gcr.io/google-containers/pause:3.2");
        assert_eq!(target_of(&result), "mirror/google-containers.pause:3.2");
    }

    #[test]
    fn flattens_segments_introduced_by_replacement() {
        let rw = Rewriter::new(
            rules(&[("^k8s.gcr.io", "mirror/google-containers")]),
            Target::default(),
        );
        let result = rw.rewrite("k8s.gcr.io/pause:3.2");
        assert_eq!(target_of(&result), "mirror.google-containers.pause:3.2");
    }

    #[test]
    fn registry_precedes_namespace() {
        let rw = Rewriter::new(
            RuleSet::defaults(),
            Target::new(
                Some("registry.example.com".into()),
                Some("mirror".into()),
            ),
        );
        let result = rw.rewrite("quay.io/coreos/etcd:v3.5.0");
        assert_eq!(
            target_of(&result),
            "registry.example.com/mirror/quay.coreos.etcd:v3.5.0"
        );
        let dst = result.target().unwrap();
        assert_eq!(dst.host(), Some("registry.example.com"));
        assert_eq!(dst.tag.as_deref(), Some("v3.5.0"));
    }

    #[test]
    fn empty_target_parts_are_ignored() {
        let rw = Rewriter::new(
            RuleSet::defaults(),
            Target::new(Some(String::new()), Some(String::new())),
        );
        assert_eq!(target_of(&rw.rewrite("ghcr.io/org/app:1")), "ghcr.org.app:1");
    }

    #[test]
    fn prior_output_is_no_match() {
        let rw = Rewriter::new(rules(&[("^gcr.io", "")]), Target::new(None, Some("mirror".into())));
        let first = target_of(&rw.rewrite("gcr.io/google-containers/pause:3.2"));
        assert!(matches!(rw.rewrite(&first), RewriteResult::NoMatch { .. }));
    }

    #[test]
    fn case_only_change_is_no_match() {
        let rw = Rewriter::new(rules(&[("^GCR", "gcr")]), Target::default());
        assert!(matches!(
            rw.rewrite("GCR.io/foo:v1"),
            RewriteResult::NoMatch { .. }
        ));
    }

    #[test]
    fn later_rule_can_still_change_after_identity_rule() {
        let rw = Rewriter::new(
            rules(&[("^quay.io", "quay.io"), ("^quay.io", "quay")]),
            Target::default(),
        );
        // Duplicate key: the last replacement wins, at the first position.
        assert_eq!(target_of(&rw.rewrite("quay.io/a/b:1")), "quay.a.b:1");

        let rw = Rewriter::new(
            rules(&[("^(quay)", "$1"), ("^quay.io", "quay")]),
            Target::default(),
        );
        assert_eq!(target_of(&rw.rewrite("quay.io/a/b:1")), "quay.a.b:1");
    }

    #[test]
    fn empty_source_is_rejected() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::default());
        assert!(matches!(
            rw.rewrite("  "),
            RewriteResult::Rejected {
                reason: Rejection::EmptyReference,
                ..
            }
        ));
    }

    #[test]
    fn rule_erasing_everything_is_invalid_target() {
        let rw = Rewriter::new(rules(&[("^.*$", "")]), Target::new(None, Some("mirror".into())));
        assert!(matches!(
            rw.rewrite("gcr.io/foo:v1"),
            RewriteResult::Rejected {
                reason: Rejection::InvalidTarget(_),
                ..
            }
        ));
    }

    #[test]
    fn rule_introducing_digest_is_invalid_target() {
        let rw = Rewriter::new(rules(&[(":latest$", "@sha256:00")]), Target::default());
        assert!(matches!(
            rw.rewrite("gcr.io/foo:latest"),
            RewriteResult::Rejected {
                reason: Rejection::InvalidTarget(_),
                ..
            }
        ));
    }

    #[test]
    fn malformed_inputs_are_classified() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::new(None, Some("m".into())));
        for input in ["::::", "/", "gcr.io", "gcr.io/", "docker.io//x", "\u{1F600}", "a b c"] {
            let _ = rw.rewrite(input);
        }
        assert!(matches!(rw.rewrite("gcr.io/"), RewriteResult::Rejected { .. }));
        assert_eq!(target_of(&rw.rewrite("docker.io//x")), "m/docker..x");
    }

    #[test]
    fn stripped_port_is_invalid_target() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::new(None, Some("mirror".into())));
        assert_eq!(
            rw.rewrite("gcr.io:443/foo:v1"),
            RewriteResult::Rejected {
                source: "gcr.io:443/foo:v1".into(),
                reason: Rejection::InvalidTarget("mirror/:443.foo:v1".into()),
            }
        );
    }

    #[test]
    fn whitespace_is_invalid_target() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::new(None, Some("mirror".into())));
        assert_eq!(
            rw.rewrite("quay.io/foo bar:v1"),
            RewriteResult::Rejected {
                source: "quay.io/foo bar:v1".into(),
                reason: Rejection::InvalidTarget("mirror/quay.foo bar:v1".into()),
            }
        );
    }

    #[test]
    fn interior_empty_segments_survive_restore() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::new(None, Some("mirror".into())));
        let target = target_of(&rw.rewrite("docker.io//x:1"));
        assert_eq!(target, "mirror/docker..x:1");
        assert_eq!(rw.restore(&target).as_deref(), Some("docker//x:1"));
    }

    #[test]
    fn rewriter_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Rewriter>();
        assert_send_sync::<RewriteResult>();
    }

    #[test]
    fn rewriting_is_deterministic() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::new(None, Some("mirror".into())));
        for input in ["k8s.gcr.io/pause:3.2", "docker.io/library/nginx:1.25", "x/y"] {
            assert_eq!(rw.rewrite(input), rw.rewrite(input));
        }
    }

    #[test]
    fn source_is_trimmed() {
        let rw = Rewriter::new(RuleSet::defaults(), Target::default());
        match rw.rewrite("  ghcr.io/org/app:1 \n") {
            RewriteResult::Rewritten { source, .. } => {
                assert_eq!(source.to_string(), "ghcr.io/org/app:1");
            }
            other => panic!("expected Rewritten, got {other:?}"),
        }
    }

    #[test]
    fn restore_inverts_flattening() {
        let rw = Rewriter::new(
            RuleSet::defaults(),
            Target::new(Some("registry.example.com".into()), Some("mirror".into())),
        );
        let target = target_of(&rw.rewrite("k8s.gcr.io/ingress-nginx/controller:v1.9.4"));
        assert_eq!(
            target,
            "registry.example.com/mirror/google-containers.ingress-nginx.controller:v1.9.4"
        );
        assert_eq!(
            rw.restore(&target).as_deref(),
            Some("google-containers/ingress-nginx/controller:v1.9.4")
        );
        assert_eq!(rw.restore("other.example.com/mirror/x:1"), None);
        assert_eq!(rw.restore("registry.example.com/mirror/a/b"), None);
    }

    #[test]
    fn flatten_and_unflatten() {
        assert_eq!(flatten("/google-containers/pause:3.2"), "google-containers.pause:3.2");
        assert_eq!(unflatten("quay.coreos.etcd:v3.5.0"), "quay/coreos/etcd:v3.5.0");
        assert_eq!(unflatten("ghcr.org.app"), "ghcr/org/app");
    }
}
