//! User directory.
//!
//! Murmur does not store credentials. The directory only records which
//! identities exist so that tokens are issued for known users.

mod repository;

pub use repository::{User, UserRepository, validate_username};
