//! Rule-based container image reference rewriting.
//!
//! `porter` maps image references hosted on hard-to-reach registries
//! (`gcr.io`, `k8s.gcr.io`, `quay.io`, `ghcr.io`, ...) to references in a
//! single mirror namespace. The mapping is an ordered list of regex rules
//! followed by path flattening:
//!
//! ```
//! use porter::{Rewriter, RuleSet, Target};
//!
//! let rewriter = Rewriter::new(RuleSet::defaults(), Target::new(None, Some("mirror".into())));
//! let result = rewriter.rewrite("k8s.gcr.io/pause:3.2");
//! assert_eq!(
//!     result.target().map(ToString::to_string).as_deref(),
//!     Some("mirror/google-containers.pause:3.2"),
//! );
//! ```

pub mod config;
mod error;
pub mod reference;
mod rewrite;
pub mod rule;

pub use config::Settings;
pub use error::{Error, Result};
pub use reference::Reference;
pub use rewrite::{Rejection, RewriteResult, Rewriter, Target, flatten, unflatten};
pub use rule::{Rule, RuleOrder, RuleSet};
