//! service-core: shared HTTP infrastructure for the social-poster workspace.
pub mod error;
pub mod middleware;
pub mod observability;
