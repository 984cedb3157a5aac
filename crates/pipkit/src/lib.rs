//! # pipkit
//!
//! Pure Rust plumbing for driving Python package managers.
//!
//! This crate provides functionality for:
//! - Running `uv pip` or `python -m pip` with a time budget
//! - Picking uv when it responds, falling back to pip otherwise
//! - Reading installed versions straight from site-packages metadata
//! - Detecting conflicting and corrupted installs
//! - Removing a package's directories when the package manager cannot
//!
//! ## Example
//!
//! ```no_run
//! use pipkit::{Backend, BackendSource, Inspector, PythonEnv, Selector, SitePackages};
//! use std::time::Duration;
//!
//! let mut python = PythonEnv::new("/usr/bin/python3");
//! python.discover_site_dirs(Duration::from_secs(5));
//!
//! let site = SitePackages::for_env(&python);
//! if site.installed_version("numpy").is_none() {
//!     let backend = Selector::new(python).resolve();
//!     backend
//!         .install(&["numpy".to_string()], Duration::from_secs(600))
//!         .expect("could not start the package manager");
//! }
//! ```
//!
//! ## Failure Categories
//!
//! Failed commands are classified from their output with
//! [`CommandOutput::classify`]. A [`ErrorCategory::Lock`] means a running
//! process holds the files and the operation should simply be retried later.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod process;
pub mod purge;
pub mod python;
pub mod requirements;
pub mod select;
pub mod site;
pub mod types;
pub mod version;

pub use backend::{Backend, MockBackend};
pub use error::{Error, ErrorCategory, Result};
pub use purge::Purger;
pub use python::PythonEnv;
pub use requirements::{InstallSpec, Requirement, parse_requirement};
pub use select::{BackendSource, Selector, StaticSource};
pub use site::{Inspector, SitePackages, normalize_name};
pub use types::{BackendKind, CommandOutput, Observation, Operation};
pub use version::{Constraint, VersionSpec, satisfies};
