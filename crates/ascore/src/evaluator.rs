//! Component F: ASG rule recomputation and per-client access evaluation.
//!
//! Kept as free functions over [`PolicyModel`] rather than methods, since
//! the evaluator needs no state of its own — the registry's policy lock is
//! what actually serializes these calls per spec.md §5.

use ascore_shared::{AccessRight, TrapMask};

use crate::{
    calc::evaluate_rule,
    identity::ClientIdentity,
    model::{host_matches, AsgId, PolicyModel},
};

/// Refreshes the cached `result` of every rule in one ASG from its current
/// input vector. Call this before [`evaluate_client`] whenever an input
/// changed or the policy was just loaded.
pub fn recompute_asg_rules(model: &mut PolicyModel, asg: AsgId) {
    let group = model.asg_mut(asg);
    let values = group.input_values;
    let bad = group.input_bad;
    for rule in &mut group.rules {
        rule.result = evaluate_rule(rule.calc.as_deref(), &values, bad);
    }
}

/// The filter chain from the rule evaluator: a fixed sequence of clause
/// checks in the exact order the algorithm lists them, evaluated in
/// declaration order over the ASG's rules.
pub fn evaluate_client(
    model: &PolicyModel,
    asg: AsgId,
    identity: &ClientIdentity,
    check_client_ip: bool,
) -> (AccessRight, TrapMask) {
    let mut effective = AccessRight::None;
    let mut trap_mask = TrapMask::NONE;

    let group = model.asg(asg);
    let user_id = model.intern.find(&identity.user);

    for rule in &group.rules {
        if rule.access <= effective {
            continue;
        }
        // `rule.level` is not a per-client gate: aslibtest.c's testHostNames
        // and testMethodAndAuth both hold the client at access_level 0 while
        // RULE(1,...) clauses still fire whenever their other clauses match,
        // so nothing here compares `identity.access_level` against it. The
        // field is carried through for dump (component I) only.
        if !rule.uags.is_empty() {
            let is_member = user_id
                .map(|id| rule.uags.iter().any(|uag| model.uag(*uag).users.contains(&id)))
                .unwrap_or(false);
            if !is_member {
                continue;
            }
        }
        if !rule.hags.is_empty() {
            let in_hag = rule
                .hags
                .iter()
                .any(|hag| host_matches(model, *hag, &identity.host, check_client_ip));
            if !in_hag {
                continue;
            }
        }
        if !rule.methods.is_empty() {
            let matches_method = rule.methods.iter().any(|id| model.resolve(*id) == identity.method);
            if !matches_method {
                continue;
            }
        }
        if !rule.authorities.is_empty() {
            let matches_authority = rule
                .authorities
                .iter()
                .any(|id| model.resolve(*id) == identity.authority);
            if !matches_authority {
                continue;
            }
        }
        if let Some(required) = rule.is_tls_required.as_option() {
            let actual = identity.is_tls.as_option().unwrap_or(false);
            if actual != required {
                continue;
            }
        }
        if !rule.result {
            continue;
        }

        effective = rule.access;
        if rule.trap_write {
            trap_mask.set(TrapMask::TRAP_WRITE);
        }
    }

    (effective, trap_mask)
}
