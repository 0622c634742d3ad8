//! Issue tracker access.

pub mod bugzilla;
pub mod traits;

pub use bugzilla::BugzillaClient;
pub use traits::IssueTracker;
