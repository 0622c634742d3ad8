//! Triage core library: bug model, reproduction search, workflow, and the
//! collaborator adapters it runs against.
//!
//! The main entry point is [`workflow::TriageSession`], which takes one
//! [`bug::Bug`] through confirm / bisect / verify / trace capture using the
//! external systems bundled in [`collab::Collaborators`].

pub mod attachments;
pub mod bisect;
pub mod bug;
pub mod build;
pub mod collab;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod external;
pub mod hg;
pub mod progress;
pub mod repro;
pub mod trace;
pub mod tracker;
pub mod transport;
pub mod workflow;
