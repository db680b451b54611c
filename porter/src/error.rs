//! Error types for porter configuration and reference parsing.

use std::path::PathBuf;

/// Alias for `Result<T, porter::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned while loading rules or parsing references.
///
/// Rewriting itself never fails: every input is classified by
/// [`RewriteResult`](crate::RewriteResult) instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The image reference string could not be parsed.
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// The image reference is pinned by digest.
    #[error("digest references are not supported: {0}")]
    DigestUnsupported(String),

    /// A rule pattern is not a valid regular expression.
    #[error("invalid rule pattern `{pattern}`: {source}")]
    InvalidRulePattern {
        /// The offending pattern source.
        pattern: String,
        /// The regex compilation error.
        source: regex::Error,
    },

    /// A rule replacement contains a literal `.`, which would make
    /// path flattening irreversible.
    #[error("replacement `{replacement}` for rule `{pattern}` must not contain `.`")]
    DottedReplacement {
        /// The rule pattern.
        pattern: String,
        /// The offending replacement.
        replacement: String,
    },

    /// A settings or rules document could not be parsed.
    #[error("invalid configuration in {}: {source}", .path.display())]
    Config {
        /// The document that failed to parse.
        path: PathBuf,
        /// The YAML error.
        source: serde_yaml::Error,
    },

    /// Filesystem I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
