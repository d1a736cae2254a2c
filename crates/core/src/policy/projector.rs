use crate::domain::entity::{Department, FlagMap, OverallStatus};
use crate::policy::table::EntityChain;

/// Derive the overall status of an entity from its flag map.
///
/// Rejection is sticky: any rejected flag wins regardless of what else has
/// been decided. Skipped steps count as satisfied. `Completed` is never
/// produced here; only the memo payment transition reaches it.
pub fn project(
    chain: &EntityChain,
    creator_department: &Department,
    flags: &FlagMap,
) -> OverallStatus {
    if flags.any_rejected() {
        return OverallStatus::Rejected;
    }

    let mut approved = 0usize;
    let mut applicable = 0usize;
    for step in chain.applicable_steps(creator_department) {
        applicable += 1;
        if flags.get(step.slot).is_approved() {
            approved += 1;
        }
    }

    if applicable > 0 && approved == applicable {
        OverallStatus::Approved
    } else if approved > 0 {
        OverallStatus::InReview
    } else {
        OverallStatus::Pending
    }
}
