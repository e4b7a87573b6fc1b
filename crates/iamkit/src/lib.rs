//! # iamkit
//!
//! IAM operations for instance profiles, roles and inline role policies.
//!
//! This crate provides:
//! - A [`Backend`] trait covering the twelve IAM calls needed to provision a
//!   node instance profile
//! - A real backend driving the `aws` CLI, and an in-memory backend for tests
//! - Error classification into four kinds ([`ErrorKind`]): `NotFound`,
//!   `AlreadyExists`, `LimitExceeded` and `Provider`
//!
//! ## Example
//!
//! ```no_run
//! use iamkit::{Backend, default_backend, ownership_tags, DEFAULT_PATH};
//!
//! let backend = default_backend().expect("aws CLI not available");
//! let tags = ownership_tags("demo-profile", "demo");
//! match backend.create_instance_profile("demo-profile", DEFAULT_PATH, &tags) {
//!     Ok(profile) => println!("created {}", profile.id),
//!     Err(e) if e.is_already_exists() => println!("already there"),
//!     Err(e) => eprintln!("failed: {e}"),
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::{Backend, default_backend};
pub use error::{Error, ErrorKind, Result};
pub use types::{
    COMPUTE_SERVICE_PRINCIPAL, DEFAULT_PATH, InstanceProfileInfo, ROLE_DESCRIPTION, RoleInfo,
    TAG_CLUSTER, TAG_NAME, Tags, assume_role_policy, ownership_tags,
};
