//! The typed in-memory policy representation (component E): UAGs, HAGs,
//! ASGs, rules, and input bindings. Intern tables (component A) own every
//! name that appears in the policy text; the model itself is built once by
//! [`PolicyModel::from_parsed`] and is otherwise immutable until the next
//! `initialize` swap.

use std::collections::HashMap;

use ascore_shared::{AccessRight, InternId, InternTable, Tristate};

use crate::{
    calc::{compile_rule_calc, CalcEngine, CompiledExpr, InputBitmap, MAX_INPUTS},
    error::{BadConfigSnafu, DupAsgSnafu, DupAuthoritySnafu, DupMethodSnafu, Error, NoHagSnafu, NoUagSnafu},
    grammar::{ParsedAsg, ParsedFile, ParsedRule},
    host_match::{self, HostResolver, ResolvedHost},
};
use snafu::ensure;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UagId(pub u32);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HagId(pub u32);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsgId(pub u32);

#[derive(Debug)]
pub struct UserAccessGroup {
    pub name: InternId,
    pub users: Vec<InternId>,
}

#[derive(Debug)]
pub struct HostAccessGroup {
    pub name: InternId,
    pub hosts: Vec<ResolvedHost>,
}

#[derive(Debug)]
pub struct InputBinding {
    pub index: usize,
    pub symbolic_name: String,
}

pub struct Rule {
    pub access: AccessRight,
    pub level: u32,
    pub calc: Option<Box<dyn CompiledExpr>>,
    /// The original `CALC(...)` text, kept alongside the compiled form
    /// purely so dump (component I) can reproduce it byte for byte —
    /// `CompiledExpr` gives no way back from a boxed predicate to source.
    pub calc_text: Option<String>,
    pub inputs_used: InputBitmap,
    pub trap_write: bool,
    pub uags: Vec<UagId>,
    pub hags: Vec<HagId>,
    pub methods: Vec<InternId>,
    pub authorities: Vec<InternId>,
    pub is_tls_required: Tristate,
    /// Cached truth value of `calc`, refreshed by `recompute_asg_rules`.
    pub result: bool,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("access", &self.access)
            .field("level", &self.level)
            .field("calc", &self.calc.as_ref().map(|_| "<compiled expr>"))
            .field("calc_text", &self.calc_text)
            .field("inputs_used", &self.inputs_used)
            .field("trap_write", &self.trap_write)
            .field("uags", &self.uags)
            .field("hags", &self.hags)
            .field("methods", &self.methods)
            .field("authorities", &self.authorities)
            .field("is_tls_required", &self.is_tls_required)
            .field("result", &self.result)
            .finish()
    }
}

#[derive(Debug)]
pub struct AccessSecurityGroup {
    pub name: InternId,
    pub rules: Vec<Rule>,
    pub inputs: Vec<InputBinding>,
    pub input_values: [f64; MAX_INPUTS],
    pub input_bad: InputBitmap,
}

impl AccessSecurityGroup {
    fn new(name: InternId) -> Self {
        Self {
            name,
            rules: Vec::new(),
            inputs: Vec::new(),
            input_values: [0.0; MAX_INPUTS],
            input_bad: InputBitmap::EMPTY,
        }
    }
}

pub const DEFAULT_ASG_NAME: &str = "DEFAULT";

/// The fully linked policy: every UAG/HAG/method/authority reference in a
/// rule has been resolved to an id or interned string, and every
/// `CALC(...)` clause has been compiled.
#[derive(Debug)]
pub struct PolicyModel {
    pub intern: InternTable,
    pub uags: Vec<UserAccessGroup>,
    pub uag_index: HashMap<InternId, UagId>,
    pub hags: Vec<HostAccessGroup>,
    pub hag_index: HashMap<InternId, HagId>,
    pub asgs: Vec<AccessSecurityGroup>,
    pub asg_index: HashMap<InternId, AsgId>,
    /// Declaration order of ASG names, preserved for dump (component I).
    pub asg_order: Vec<AsgId>,
    pub uag_order: Vec<UagId>,
    pub hag_order: Vec<HagId>,
}

impl PolicyModel {
    pub fn uag(&self, id: UagId) -> &UserAccessGroup {
        &self.uags[id.0 as usize]
    }

    pub fn hag(&self, id: HagId) -> &HostAccessGroup {
        &self.hags[id.0 as usize]
    }

    pub fn asg(&self, id: AsgId) -> &AccessSecurityGroup {
        &self.asgs[id.0 as usize]
    }

    pub fn asg_mut(&mut self, id: AsgId) -> &mut AccessSecurityGroup {
        &mut self.asgs[id.0 as usize]
    }

    pub fn find_asg(&self, name: &str) -> Option<AsgId> {
        let id = self.intern.find(name)?;
        self.asg_index.get(&id).copied()
    }

    pub fn default_asg(&self) -> AsgId {
        self.find_asg(DEFAULT_ASG_NAME)
            .expect("DEFAULT is synthesized by from_parsed if absent")
    }

    pub fn resolve(&self, id: InternId) -> &str {
        self.intern.resolve(id)
    }

    /// Links a parsed AST into a fully resolved model. This is the single
    /// consumer of [`ParsedFile`] regardless of which surface syntax
    /// produced it, which is what makes the two front ends produce
    /// identical model content for equivalent input.
    pub fn from_parsed(
        file: ParsedFile,
        calc_engine: &dyn CalcEngine,
        resolver: &dyn HostResolver,
    ) -> Result<PolicyModel, Error> {
        let mut intern = InternTable::new();
        // UAG, HAG, and ASG names share one global namespace, matching the
        // source's single generic symbol hash table.
        let mut group_names = std::collections::HashSet::new();

        let mut uags = Vec::new();
        let mut uag_index = HashMap::new();
        let mut uag_order = Vec::new();

        for parsed in file.uags {
            let name_id = intern.intern(&parsed.name);
            ensure!(
                group_names.insert(name_id),
                DupAsgSnafu { name: parsed.name.clone() }
            );
            let users = parsed.members.iter().map(|u| intern.intern(u)).collect();
            let id = UagId(uags.len() as u32);
            uags.push(UserAccessGroup { name: name_id, users });
            uag_index.insert(name_id, id);
            uag_order.push(id);
        }

        let mut hags = Vec::new();
        let mut hag_index = HashMap::new();
        let mut hag_order = Vec::new();

        for parsed in file.hags {
            let name_id = intern.intern(&parsed.name);
            ensure!(
                group_names.insert(name_id),
                DupAsgSnafu { name: parsed.name.clone() }
            );
            let hosts = parsed
                .members
                .iter()
                .map(|literal| ResolvedHost {
                    literal: literal.clone(),
                    ipv4: resolver.resolve_ipv4(literal),
                })
                .collect();
            let id = HagId(hags.len() as u32);
            hags.push(HostAccessGroup { name: name_id, hosts });
            hag_index.insert(name_id, id);
            hag_order.push(id);
        }

        ensure!(
            !file.asgs.is_empty(),
            BadConfigSnafu {
                location: "policy".to_owned(),
                message: "no ASG defined".to_owned(),
            }
        );

        let mut asgs = Vec::new();
        let mut asg_index = HashMap::new();
        let mut asg_order = Vec::new();
        let mut saw_default = false;

        for parsed in &file.asgs {
            if parsed.name == DEFAULT_ASG_NAME {
                saw_default = true;
            }
            let name_id = intern.intern(&parsed.name);
            ensure!(
                group_names.insert(name_id),
                DupAsgSnafu { name: parsed.name.clone() }
            );
            let asg = build_asg(parsed, name_id, &mut intern, &uag_index, &hag_index, calc_engine)?;
            let id = AsgId(asgs.len() as u32);
            asgs.push(asg);
            asg_index.insert(name_id, id);
            asg_order.push(id);
        }

        if !saw_default {
            let name_id = intern.intern(DEFAULT_ASG_NAME);
            let mut asg = AccessSecurityGroup::new(name_id);
            asg.rules.push(Rule {
                access: AccessRight::None,
                level: 0,
                calc: None,
                calc_text: None,
                inputs_used: InputBitmap::EMPTY,
                trap_write: false,
                uags: Vec::new(),
                hags: Vec::new(),
                methods: Vec::new(),
                authorities: Vec::new(),
                is_tls_required: Tristate::Unset,
                result: true,
            });
            let id = AsgId(asgs.len() as u32);
            asgs.push(asg);
            asg_index.insert(name_id, id);
            asg_order.push(id);
        }

        Ok(PolicyModel {
            intern,
            uags,
            uag_index,
            hags,
            hag_index,
            asgs,
            asg_index,
            asg_order,
            uag_order,
            hag_order,
        })
    }
}

fn build_asg(
    parsed: &ParsedAsg,
    name_id: InternId,
    intern: &mut InternTable,
    uag_index: &HashMap<InternId, UagId>,
    hag_index: &HashMap<InternId, HagId>,
    calc_engine: &dyn CalcEngine,
) -> Result<AccessSecurityGroup, Error> {
    let mut asg = AccessSecurityGroup::new(name_id);

    for link in &parsed.inputs {
        asg.inputs.push(InputBinding {
            index: link.index,
            symbolic_name: link.symbolic_name.clone(),
        });
    }

    for parsed_rule in &parsed.rules {
        asg.rules.push(build_rule(parsed_rule, intern, uag_index, hag_index, calc_engine)?);
    }

    Ok(asg)
}

fn build_rule(
    parsed: &ParsedRule,
    intern: &mut InternTable,
    uag_index: &HashMap<InternId, UagId>,
    hag_index: &HashMap<InternId, HagId>,
    calc_engine: &dyn CalcEngine,
) -> Result<Rule, Error> {
    let mut uags = Vec::new();
    for name in &parsed.uags {
        let id = intern.intern(name);
        let uag_id = uag_index.get(&id).copied().context_no_uag(name)?;
        uags.push(uag_id);
    }

    let mut hags = Vec::new();
    for name in &parsed.hags {
        let id = intern.intern(name);
        let hag_id = hag_index.get(&id).copied().context_no_hag(name)?;
        hags.push(hag_id);
    }

    let mut methods = Vec::new();
    let mut seen_methods = std::collections::HashSet::new();
    for name in &parsed.methods {
        ensure!(seen_methods.insert(name.clone()), DupMethodSnafu { name: name.clone() });
        methods.push(intern.intern(name));
    }

    let mut authorities = Vec::new();
    let mut seen_authorities = std::collections::HashSet::new();
    for name in &parsed.authorities {
        ensure!(
            seen_authorities.insert(name.clone()),
            DupAuthoritySnafu { name: name.clone() }
        );
        authorities.push(intern.intern(name));
    }

    let (calc, inputs_used) = match &parsed.calc {
        Some(text) => {
            let compiled = compile_rule_calc(calc_engine, text)?;
            let bits = compiled.referenced_inputs();
            (Some(compiled), bits)
        }
        None => (None, InputBitmap::EMPTY),
    };

    Ok(Rule {
        access: parsed.access,
        level: parsed.level,
        calc,
        calc_text: parsed.calc.clone(),
        inputs_used,
        trap_write: parsed.trap_write,
        uags,
        hags,
        methods,
        authorities,
        is_tls_required: parsed.is_tls_required,
        result: true,
    })
}

trait OptionExt<T> {
    fn context_no_uag(self, name: &str) -> Result<T, Error>;
    fn context_no_hag(self, name: &str) -> Result<T, Error>;
}

impl<T> OptionExt<T> for Option<T> {
    fn context_no_uag(self, name: &str) -> Result<T, Error> {
        self.ok_or_else(|| NoUagSnafu { name: name.to_owned() }.build())
    }

    fn context_no_hag(self, name: &str) -> Result<T, Error> {
        self.ok_or_else(|| NoHagSnafu { name: name.to_owned() }.build())
    }
}

pub fn host_matches(model: &PolicyModel, hag: HagId, client_host: &str, check_client_ip: bool) -> bool {
    model
        .hag(hag)
        .hosts
        .iter()
        .any(|entry| host_match::matches(entry, client_host, check_client_ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::SimpleCalc;
    use crate::grammar::classic;
    use crate::host_match::SystemResolver;
    use std::collections::HashMap as Map;

    fn build(source: &str) -> Result<PolicyModel, Error> {
        let parsed = classic::parse(source, &Map::new()).unwrap();
        PolicyModel::from_parsed(parsed, &SimpleCalc, &SystemResolver)
    }

    #[test]
    fn missing_default_is_synthesized() {
        let model = build("ASG(ro){RULE(0,NONE)}").unwrap();
        let default_id = model.find_asg("DEFAULT").unwrap();
        assert_eq!(model.asg(default_id).rules.len(), 1);
        assert_eq!(model.asg(default_id).rules[0].access, AccessRight::None);
    }

    #[test]
    fn undefined_uag_reference_fails() {
        let err = build("ASG(ro){RULE(0,NONE){UAG(nobody)}}").unwrap_err();
        assert!(matches!(err, Error::NoUag { .. }));
    }

    #[test]
    fn duplicate_method_within_one_rule_is_rejected() {
        let err =
            build(r#"ASG(foo){RULE(0,NONE){METHOD("x509","x509")}}"#).unwrap_err();
        assert!(matches!(err, Error::DupMethod { .. }));
    }

    #[test]
    fn duplicate_method_across_rules_is_allowed() {
        let model = build(
            r#"ASG(foo){RULE(0,NONE){METHOD("x509")} RULE(1,RPC){METHOD("x509")}}"#,
        )
        .unwrap();
        let id = model.find_asg("foo").unwrap();
        assert_eq!(model.asg(id).rules.len(), 2);
    }
}
