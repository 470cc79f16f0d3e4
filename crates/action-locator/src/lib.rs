//! Element location by logical role.
//!
//! Selectors live in an injected, versioned [`RoleMap`] rather than in call sites;
//! [`ElementLocator`] resolves a [`LocatorRole`] against it, waiting on document
//! mutations until the role renders or the timeout passes.

pub mod errors;
pub mod locator;
pub mod roles;

pub use errors::*;
pub use locator::*;
pub use roles::*;
