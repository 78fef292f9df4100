//! weft — a component-oriented version-control core.
//!
//! weft models component history as a content-addressed DAG of immutable
//! records, represents *lanes* (named branch-like pointers onto that DAG),
//! and performs the *checkout* operation that reconciles a working copy
//! with a chosen version — including three-way merging of modified files
//! and of per-component configuration.
//!
//! The crate is organized in three layers:
//!
//! - **object model & repository** — [`model`] (records and identifiers)
//!   and [`store`] (the content-addressed object store);
//! - **history traversal** — [`traversal`] (reachability, divergence,
//!   merge-pending);
//! - **checkout engine** — [`checkout`] orchestrating [`merge`],
//!   [`bitmap`], and the external capabilities in [`host`].

pub mod bitmap;
pub mod checkout;
pub mod error;
pub mod host;
pub mod merge;
pub mod model;
pub mod session;
pub mod store;
pub mod traversal;

pub use error::WeftError;

/// The workspace metadata directory name.
pub const WEFT_DIR: &str = ".weft";

/// The objects subdirectory inside [`WEFT_DIR`].
pub const OBJECTS_DIR: &str = "objects";

/// The bitmap file name inside [`WEFT_DIR`].
pub const BITMAP_FILE: &str = "bitmap.json";
