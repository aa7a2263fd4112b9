//! Claim-system property test: at any time at most one claim on a node is
//! active, and a dominating claim preempts and is served before any
//! weaker waiter.

use labflow_common::{ClaimOutcome, ClaimRegistry};

#[test]
fn exactly_one_claim_is_ever_active_through_a_chain_of_preemptions() {
    let registry: ClaimRegistry<&'static str> = ClaimRegistry::new();
    let root = registry.root_symbol();

    let generation: Vec<_> = (0..5).map(|_| registry.child_symbol(root)).collect();

    for (i, symbol) in generation.iter().enumerate() {
        let outcome = registry.attempt("shared-node", *symbol);
        if i == 0 {
            assert_eq!(outcome, ClaimOutcome::Granted);
        } else {
            // Each later sibling is newer than the last, so it preempts.
            assert_eq!(outcome, ClaimOutcome::Preempted);
        }
        // Exactly the symbol that just attempted is now active — never two
        // at once, and never the wrong one.
        assert_eq!(registry.active(&"shared-node"), Some(*symbol));
    }

    // Releasing the active holder always hands the node to exactly one
    // successor (never zero, never more than one waiter promoted).
    let active = generation.last().copied().unwrap();
    let next = registry.release(&"shared-node", active);
    assert!(next.is_some());
    assert_eq!(registry.active(&"shared-node"), next);
}

#[test]
fn a_child_claim_can_never_preempt_its_own_ancestor() {
    let registry: ClaimRegistry<&'static str> = ClaimRegistry::new();
    let root = registry.root_symbol();
    let parent = registry.child_symbol(root);
    let child = registry.child_symbol(parent);

    assert_eq!(registry.attempt("node", parent), ClaimOutcome::Granted);
    assert_eq!(registry.attempt("node", child), ClaimOutcome::Waiting);
    assert_eq!(registry.active(&"node"), Some(parent));
}

#[test]
fn releasing_a_queued_waiter_does_not_disturb_the_active_holder() {
    let registry: ClaimRegistry<&'static str> = ClaimRegistry::new();
    let root = registry.root_symbol();
    let holder = registry.child_symbol(root);
    let waiter = registry.child_symbol(root);

    registry.attempt("node", holder);
    registry.attempt("node", waiter);

    assert_eq!(registry.release(&"node", waiter), None);
    assert_eq!(registry.active(&"node"), Some(holder));
}
