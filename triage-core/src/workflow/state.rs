//! Action selection. Workflow state is derived from the bug on every run and
//! never stored.

use crate::bug::{Branch, Bug};
use crate::config::{PolicySection, ReanalysisPolicy};

/// The mutually exclusive action a session runs before trace capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Verify,
    Confirm,
    Bisect,
}

impl PrimaryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Confirm => "confirm",
            Self::Bisect => "bisect",
        }
    }
}

/// Pick the primary action: verify, then confirm, then bisect. With
/// `force_confirm`, an open bug that needs none of them is confirmed anyway.
pub fn primary_action(
    bug: &Bug,
    policy: &PolicySection,
    branches: &[Branch],
    force_confirm: bool,
) -> Option<PrimaryAction> {
    if needs_verify(bug, policy, branches) {
        Some(PrimaryAction::Verify)
    } else if needs_confirm(bug, policy) {
        Some(PrimaryAction::Confirm)
    } else if needs_bisect(bug) {
        Some(PrimaryAction::Bisect)
    } else if force_confirm && policy.is_open(bug.status()) {
        Some(PrimaryAction::Confirm)
    } else {
        None
    }
}

pub fn needs_confirm(bug: &Bug, policy: &PolicySection) -> bool {
    let open = policy.is_open(bug.status());
    let analyze = bug.has_command("analyze");
    match policy.reanalysis {
        ReanalysisPolicy::OpenStatusOnly => open && (analyze || !bug.has_command("confirmed")),
        ReanalysisPolicy::Unconditional => analyze || (open && !bug.has_command("confirmed")),
    }
}

/// Resolved-fixed bugs not yet verified, and verified bugs that still have
/// a branch flagged `fixed`.
pub fn needs_verify(bug: &Bug, policy: &PolicySection, branches: &[Branch]) -> bool {
    let analyze = bug.has_command("analyze");
    let fixed = bug.resolution() == "FIXED";
    let verifiable = bug.status() == "RESOLVED" && fixed;
    let forced = match policy.reanalysis {
        ReanalysisPolicy::OpenStatusOnly => verifiable && analyze,
        ReanalysisPolicy::Unconditional => fixed && analyze,
    };
    if forced || (verifiable && !bug.has_command("verified")) {
        return true;
    }

    bug.status() == "VERIFIED"
        && branches.iter().any(|b| {
            bug.status_flag(&b.status_flag(&policy.status_flag_prefix)) == Some("fixed")
        })
}

pub fn needs_bisect(bug: &Bug) -> bool {
    bug.has_command("bisect") && !bug.has_command("bisected")
}

pub fn needs_trace(bug: &Bug) -> bool {
    !bug.has_command("pernosco-failed")
        && (bug.has_command("pernosco") || bug.has_keyword("pernosco-wanted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bug::BugRecord;

    fn bug(status: &str, resolution: &str, whiteboard: &str) -> Bug {
        let record = BugRecord {
            id: 1,
            status: status.into(),
            resolution: resolution.into(),
            whiteboard: whiteboard.into(),
            ..BugRecord::default()
        };
        Bug::new(record, "bugmon").unwrap()
    }

    fn branches() -> Vec<Branch> {
        vec![
            Branch {
                alias: "central".into(),
                version: 130,
            },
            Branch {
                alias: "esr115".into(),
                version: 115,
            },
        ]
    }

    #[test]
    fn open_unconfirmed_bug_needs_confirm() {
        let policy = PolicySection::default();
        assert!(needs_confirm(&bug("NEW", "", ""), &policy));
        assert!(!needs_confirm(&bug("NEW", "", "[bugmon:confirmed]"), &policy));
        assert!(needs_confirm(&bug("NEW", "", "[bugmon:confirmed,analyze]"), &policy));
        assert!(!needs_confirm(&bug("RESOLVED", "FIXED", "[bugmon:analyze]"), &policy));
    }

    #[test]
    fn unconditional_reanalysis_ignores_status() {
        let policy = PolicySection {
            reanalysis: ReanalysisPolicy::Unconditional,
            ..PolicySection::default()
        };
        assert!(needs_confirm(&bug("RESOLVED", "INCOMPLETE", "[bugmon:analyze]"), &policy));
        assert!(!needs_confirm(&bug("RESOLVED", "INCOMPLETE", "[bugmon:confirmed]"), &policy));
    }

    #[test]
    fn resolved_fixed_needs_verify() {
        let policy = PolicySection::default();
        assert!(needs_verify(&bug("RESOLVED", "FIXED", ""), &policy, &[]));
        assert!(!needs_verify(&bug("RESOLVED", "FIXED", "[bugmon:verified]"), &policy, &[]));
        assert!(needs_verify(
            &bug("RESOLVED", "FIXED", "[bugmon:verified,analyze]"),
            &policy,
            &[]
        ));
        assert!(!needs_verify(&bug("RESOLVED", "WONTFIX", ""), &policy, &[]));
    }

    #[test]
    fn verified_bug_with_fixed_branch_needs_verify() {
        let policy = PolicySection::default();
        let mut b = bug("VERIFIED", "FIXED", "");
        assert!(!needs_verify(&b, &policy, &branches()));
        b.set_status_flag("cf_status_firefox_esr115", "fixed");
        assert!(needs_verify(&b, &policy, &branches()));
        b.set_status_flag("cf_status_firefox_esr115", "verified");
        assert!(!needs_verify(&b, &policy, &branches()));
    }

    #[test]
    fn bisect_runs_once() {
        assert!(needs_bisect(&bug("NEW", "", "[bugmon:bisect]")));
        assert!(!needs_bisect(&bug("NEW", "", "[bugmon:bisect,bisected]")));
        assert!(!needs_bisect(&bug("NEW", "", "")));
    }

    #[test]
    fn trace_wanted_by_command_or_keyword() {
        let mut b = bug("NEW", "", "");
        assert!(!needs_trace(&b));
        b.add_keyword("pernosco-wanted");
        assert!(needs_trace(&b));
        b.add_command("pernosco-failed");
        assert!(!needs_trace(&b));
        assert!(needs_trace(&bug("NEW", "", "[bugmon:pernosco]")));
    }

    #[test]
    fn verify_takes_precedence_then_confirm_then_bisect() {
        let policy = PolicySection::default();
        assert_eq!(
            primary_action(&bug("RESOLVED", "FIXED", "[bugmon:bisect]"), &policy, &[], false),
            Some(PrimaryAction::Verify)
        );
        assert_eq!(
            primary_action(&bug("NEW", "", "[bugmon:bisect]"), &policy, &[], false),
            Some(PrimaryAction::Confirm)
        );
        assert_eq!(
            primary_action(&bug("NEW", "", "[bugmon:confirmed,bisect]"), &policy, &[], false),
            Some(PrimaryAction::Bisect)
        );
        assert_eq!(
            primary_action(&bug("NEW", "", "[bugmon:confirmed]"), &policy, &[], false),
            None
        );
        assert_eq!(
            primary_action(&bug("NEW", "", "[bugmon:confirmed]"), &policy, &[], true),
            Some(PrimaryAction::Confirm)
        );
        assert_eq!(
            primary_action(&bug("RESOLVED", "INCOMPLETE", ""), &policy, &[], true),
            None
        );
    }
}
