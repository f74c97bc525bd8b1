//! Run manifest export
//!
//! After a profile run the artifact ledger and run report are written as
//! JSON next to the artifacts, so later tooling can find every file a run
//! produced without globbing.

pub mod manifest;

pub use manifest::RunManifest;
