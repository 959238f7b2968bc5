//! External package registries for monodep.
//!
//! The dependency tree builder talks to registries only through the
//! [`ExternalResolver`] trait. Two implementations ship here:
//! [`HttpRegistry`] for npm-compatible registries and [`MockRegistry`] for
//! tests and offline runs from a JSON fixture.

mod error;
mod http;
mod mock;
mod resolver;

pub use error::{Error, Result};
pub use http::{DEFAULT_REGISTRY_URL, HttpRegistry, HttpRegistryConfig};
pub use mock::{
    CallCounts, MockFailure, MockRegistry, PackageFixture, RegistryFixture, VersionFixture,
};
pub use resolver::{ExternalResolver, PackageMetadata, is_latest_range, select_version};
