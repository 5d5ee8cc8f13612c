//! Component I: canonical policy dump, the textual inverse of [`crate::grammar`].
//!
//! `parse(dump(model))` must relink to an equivalent model — that round trip
//! is what the golden-byte scenario in `tests/` actually checks — so every
//! field the grammar can express has to come back out here, including the
//! crate's own `TLS(...)` clause extension and the `INPx(...)` bindings the
//! format sentence in spec.md §6 glosses over.

use itertools::Itertools;

use crate::model::{AsgId, HagId, PolicyModel, Rule, UagId};

/// Renders `model` in canonical form: UAG blocks sorted by name, then HAG
/// blocks sorted by name, then ASG blocks in declaration order. This
/// ordering (not stated for HAGs in the source format sentence) is the only
/// one under which every HAG a rule references is already defined by the
/// time that rule's `ASG` block is parsed back in.
pub fn dump(model: &PolicyModel) -> String {
    let mut out = String::new();

    for id in sorted_uag_ids(model) {
        let uag = model.uag(id);
        let members = uag.users.iter().map(|u| model.resolve(*u)).join(",");
        out.push_str(&format!("UAG({}) {{{}}}\n", model.resolve(uag.name), members));
    }

    for id in sorted_hag_ids(model) {
        let hag = model.hag(id);
        let hosts = hag.hosts.iter().map(|h| h.literal.as_str()).join(",");
        out.push_str(&format!("HAG({}) {{{}}}\n", model.resolve(hag.name), hosts));
    }

    for &id in &model.asg_order {
        dump_asg(model, id, &mut out);
    }

    out
}

fn sorted_uag_ids(model: &PolicyModel) -> Vec<UagId> {
    let mut ids: Vec<UagId> = (0..model.uags.len() as u32).map(UagId).collect();
    ids.sort_by_key(|id| model.resolve(model.uag(*id).name).to_owned());
    ids
}

fn sorted_hag_ids(model: &PolicyModel) -> Vec<HagId> {
    let mut ids: Vec<HagId> = (0..model.hags.len() as u32).map(HagId).collect();
    ids.sort_by_key(|id| model.resolve(model.hag(*id).name).to_owned());
    ids
}

fn dump_asg(model: &PolicyModel, id: AsgId, out: &mut String) {
    let asg = model.asg(id);
    out.push_str(&format!("ASG({}) {{\n", model.resolve(asg.name)));

    for binding in &asg.inputs {
        let letter = crate::grammar::input_letter(binding.index);
        out.push_str(&format!("\tINP{letter}(\"{}\")\n", binding.symbolic_name));
    }

    for rule in &asg.rules {
        dump_rule(model, rule, out);
    }

    out.push_str("}\n");
}

fn dump_rule(model: &PolicyModel, rule: &Rule, out: &mut String) {
    let trap = if rule.trap_write { "TRAPWRITE" } else { "NOTRAPWRITE" };
    let clauses = rule_clauses(model, rule);

    if clauses.is_empty() {
        out.push_str(&format!("\tRULE({},{},{trap})\n", rule.level, rule.access));
        return;
    }

    out.push_str(&format!("\tRULE({},{},{trap}) {{\n", rule.level, rule.access));
    for clause in clauses {
        out.push_str(&format!("\t\t{clause}\n"));
    }
    out.push_str("\t}\n");
}

/// Clauses in the fixed order spec.md §6 specifies — `UAG`, `HAG`, `METHOD`,
/// `AUTHORITY`, `CALC` — with the crate's own `TLS(...)` extension appended
/// last, since the source grammar has no slot for it to occupy.
fn rule_clauses(model: &PolicyModel, rule: &Rule) -> Vec<String> {
    let mut clauses = Vec::new();

    if !rule.uags.is_empty() {
        let names = rule.uags.iter().map(|id| model.resolve(model.uag(*id).name)).join(",");
        clauses.push(format!("UAG({names})"));
    }
    if !rule.hags.is_empty() {
        let names = rule.hags.iter().map(|id| model.resolve(model.hag(*id).name)).join(",");
        clauses.push(format!("HAG({names})"));
    }
    if !rule.methods.is_empty() {
        let names = rule.methods.iter().map(|id| format!("\"{}\"", model.resolve(*id))).join(",");
        clauses.push(format!("METHOD({names})"));
    }
    if !rule.authorities.is_empty() {
        let names = rule
            .authorities
            .iter()
            .map(|id| format!("\"{}\"", model.resolve(*id)))
            .join(",");
        clauses.push(format!("AUTHORITY({names})"));
    }
    if let Some(text) = &rule.calc_text {
        clauses.push(format!("CALC(\"{text}\")"));
    }
    if let Some(required) = rule.is_tls_required.as_option() {
        clauses.push(format!("TLS({})", if required { "TRUE" } else { "FALSE" }));
    }

    clauses
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::calc::SimpleCalc;
    use crate::grammar::classic;
    use crate::host_match::SystemResolver;

    fn build(source: &str) -> PolicyModel {
        let parsed = classic::parse(source, &HashMap::new()).unwrap();
        PolicyModel::from_parsed(parsed, &SimpleCalc, &SystemResolver).unwrap()
    }

    #[test]
    fn dumps_groups_sorted_by_name_before_asgs() {
        let model = build(
            "UAG(ops) {alice} UAG(bar) {bob} HAG(foo) {localhost} \
             ASG(DEFAULT) {RULE(0,NONE)}",
        );
        let dumped = dump(&model);
        assert_eq!(
            dumped,
            "UAG(bar) {bob}\nUAG(ops) {alice}\nHAG(foo) {localhost}\nASG(DEFAULT) {\n\tRULE(0,NONE,NOTRAPWRITE)\n}\n"
        );
    }

    #[test]
    fn dumps_rule_clauses_in_fixed_order_with_tls_last() {
        let model = build(
            r#"UAG(bar) {alice} HAG(foo) {localhost}
               ASG(rwx) {
                   RULE(1,RPC,TRAPWRITE) {
                       UAG(bar) HAG(foo) METHOD("x509") AUTHORITY("Epics Org CA") CALC("A") TLS(TRUE)
                   }
               }"#,
        );
        let dumped = dump(&model);
        let rwx_block = dumped.split("ASG(rwx)").nth(1).unwrap();
        let uag_at = rwx_block.find("UAG(bar)").unwrap();
        let hag_at = rwx_block.find("HAG(foo)").unwrap();
        let method_at = rwx_block.find("METHOD(").unwrap();
        let authority_at = rwx_block.find("AUTHORITY(").unwrap();
        let calc_at = rwx_block.find("CALC(").unwrap();
        let tls_at = rwx_block.find("TLS(").unwrap();
        assert!(uag_at < hag_at);
        assert!(hag_at < method_at);
        assert!(method_at < authority_at);
        assert!(authority_at < calc_at);
        assert!(calc_at < tls_at);
    }

    #[test]
    fn rule_with_no_clauses_has_no_body() {
        let model = build("ASG(ro) {RULE(0,NONE) RULE(1,READ)}");
        let dumped = dump(&model);
        assert!(dumped.contains("\tRULE(0,NONE,NOTRAPWRITE)\n"));
        assert!(dumped.contains("\tRULE(1,READ,NOTRAPWRITE)\n"));
        // Only the ASG block itself opens a brace; neither rule does.
        assert_eq!(dumped.matches('{').count(), 1);
    }

    #[test]
    fn input_bindings_round_trip() {
        let model = build(r#"ASG(foo){INPA("signal1") RULE(0,NONE,NOTRAPWRITE){CALC("A")}}"#);
        let dumped = dump(&model);
        assert!(dumped.contains("\tINPA(\"signal1\")\n"));
        let reparsed = build(&dumped);
        let asg = reparsed.find_asg("foo").unwrap();
        assert_eq!(reparsed.asg(asg).inputs[0].symbolic_name, "signal1");
    }

    /// `method_auth_config`/`expected_method_auth_config` from aslibtest.c,
    /// byte-for-byte. Covers clause-merge order (the two `METHOD`/`AUTHORITY`
    /// clauses on `rwx` must concatenate in source order) and quoted UAG
    /// member names, not just the partial properties the other tests check.
    #[test]
    fn dumps_the_real_method_auth_config_fixture_byte_exact() {
        let model = build(
            "UAG(foo) {\"testing\"}\n\
             UAG(bar) {\"boss\"}\n\
             UAG(ops) {\"geek\"}\n\
             ASG(DEFAULT) {RULE(0, NONE)}\n\
             ASG(ro) {RULE(0, NONE) RULE(1, READ) {UAG(foo) UAG(ops) METHOD(\"ca\")}}\n\
             ASG(rw) {RULE(0, NONE) RULE(1, WRITE, TRAPWRITE) {UAG(foo) METHOD(\"x509\") AUTHORITY(\"Epics Org CA\")}}\n\
             ASG(rwx) {RULE(0, NONE) RULE(1, RPC) {UAG(bar) METHOD(\"x509\", \"ignored\") METHOD(\"ignored_too\") AUTHORITY(\"Epics Org CA\", \"ignored\") AUTHORITY(\"ORNL Org CA\")}}\n",
        );
        let dumped = dump(&model);
        let expected = "UAG(bar) {boss}\n\
            UAG(foo) {testing}\n\
            UAG(ops) {geek}\n\
            ASG(DEFAULT) {\n\
            \tRULE(0,NONE,NOTRAPWRITE)\n\
            }\n\
            ASG(ro) {\n\
            \tRULE(0,NONE,NOTRAPWRITE)\n\
            \tRULE(1,READ,NOTRAPWRITE) {\n\
            \t\tUAG(foo,ops)\n\
            \t\tMETHOD(\"ca\")\n\
            \t}\n\
            }\n\
            ASG(rw) {\n\
            \tRULE(0,NONE,NOTRAPWRITE)\n\
            \tRULE(1,WRITE,TRAPWRITE) {\n\
            \t\tUAG(foo)\n\
            \t\tMETHOD(\"x509\")\n\
            \t\tAUTHORITY(\"Epics Org CA\")\n\
            \t}\n\
            }\n\
            ASG(rwx) {\n\
            \tRULE(0,NONE,NOTRAPWRITE)\n\
            \tRULE(1,RPC,NOTRAPWRITE) {\n\
            \t\tUAG(bar)\n\
            \t\tMETHOD(\"x509\",\"ignored\",\"ignored_too\")\n\
            \t\tAUTHORITY(\"Epics Org CA\",\"ignored\",\"ORNL Org CA\")\n\
            \t}\n\
            }\n";
        assert_eq!(dumped, expected);
    }

    #[test]
    fn dump_is_idempotent_under_reparse() {
        let source = r#"UAG(bar) {alice,bob}
            HAG(foo) {localhost}
            ASG(DEFAULT) {RULE(0,NONE)}
            ASG(ro) {RULE(0,NONE) RULE(1,READ) {HAG(foo)}}
            ASG(rw) {RULE(1,WRITE) {HAG(foo)}}"#;
        let model = build(source);
        let first = dump(&model);
        let reparsed = build(&first);
        let second = dump(&reparsed);
        assert_eq!(first, second);
    }
}
