//! Dependency tree construction for monodep.
//!
//! [`DependencyTreeResolver::build_tree`] turns the packages found in a
//! repository into a [`DependencyTree`]: one root per workspace package,
//! workspace dependencies resolved locally and everything else through an
//! [`monodep_registry::ExternalResolver`]. Registry failures degrade the
//! tree instead of aborting it; what went missing is recorded on the tree
//! and in its [`TreeMetadata`].
//!
//! Conflicts are found over the flattened index and come with ranked
//! [`ResolutionOption`]s.

mod builder;
mod conflicts;
mod error;
mod node;
mod options;
mod tree;

pub use builder::{DependencyTreeResolver, package_set_digest};
pub use conflicts::{
    EnhancedConflict, ResolutionOption, ResolutionStrategy, VersionChange, detect_conflicts,
    evaluate_option, resolution_options,
};
pub use error::{Error, Result};
pub use node::{DependencyKind, PackageNode, ResolutionSource};
pub use options::BuildOptions;
pub use tree::{DependencyTree, PackageEntry, ResolutionFailure, TreeMetadata, flatten};
