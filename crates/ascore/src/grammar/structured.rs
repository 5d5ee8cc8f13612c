//! The structured-form (YAML) parser. Produces the same [`ParsedFile`] the
//! classic-form parser produces, so `model::PolicyModel::from_parsed` never
//! has to know which surface syntax a policy was written in.

use std::collections::HashMap;

use ascore_shared::{AccessRight, Tristate};
use yaml_rust2::{Yaml, YamlLoader};

use super::{input_letter_index, macros, ParsedAsg, ParsedFile, ParsedGroup, ParsedInputLink, ParsedRule, SyntaxError};

fn err(message: impl Into<String>) -> SyntaxError {
    SyntaxError {
        line: 0,
        column: 0,
        message: message.into(),
    }
}

pub fn parse(source: &str, dict: &HashMap<String, String>) -> Result<ParsedFile, SyntaxError> {
    let substituted = macros::substitute(source, dict)?;
    let docs = YamlLoader::load_from_str(&substituted.text)
        .map_err(|e| err(format!("invalid YAML: {e}")))?;
    let doc = docs.first().ok_or_else(|| err("empty YAML document"))?;

    let mut file = ParsedFile::default();

    if let Some(uags) = doc["uags"].as_vec() {
        for entry in uags {
            file.uags.push(parse_group(entry, "users")?);
        }
    }
    if let Some(hags) = doc["hags"].as_vec() {
        for entry in hags {
            file.hags.push(parse_group(entry, "hosts")?);
        }
    }
    if let Some(asgs) = doc["asgs"].as_vec() {
        for entry in asgs {
            file.asgs.push(parse_asg(entry)?);
        }
    } else {
        return Err(err("no ASG defined"));
    }

    Ok(file)
}

/// `members_key` is `"users"` for a UAG entry and `"hosts"` for a HAG entry
/// — the structured form names the member list after what it holds rather
/// than using one generic `members` key.
fn parse_group(entry: &Yaml, members_key: &str) -> Result<ParsedGroup, SyntaxError> {
    let name = entry["name"]
        .as_str()
        .ok_or_else(|| err("group entry missing `name`"))?
        .to_owned();
    let members = string_list(&entry[members_key]);
    Ok(ParsedGroup { name, members })
}

fn parse_asg(entry: &Yaml) -> Result<ParsedAsg, SyntaxError> {
    let name = entry["name"]
        .as_str()
        .ok_or_else(|| err("asg entry missing `name`"))?
        .to_owned();

    let mut inputs = Vec::new();
    if let Some(links) = entry["links"].as_vec() {
        for link in links {
            let hash = link
                .as_hash()
                .ok_or_else(|| err("links entry must be a mapping INPx: <name>"))?;
            for (key, value) in hash {
                let key = key.as_str().ok_or_else(|| err("link key must be a string"))?;
                if key.len() != 4 || !key.starts_with("INP") {
                    return Err(err(format!("invalid input link key `{key}`")));
                }
                let letter = key.chars().nth(3).expect("checked length above");
                let index = input_letter_index(letter)
                    .ok_or_else(|| err(format!("input letter `{letter}` out of range A..L")))?;
                let symbolic_name = value
                    .as_str()
                    .ok_or_else(|| err("link value must be a string"))?
                    .to_owned();
                inputs.push(ParsedInputLink { index, symbolic_name });
            }
        }
    }

    let mut rules = Vec::new();
    if let Some(list) = entry["rules"].as_vec() {
        for rule in list {
            rules.push(parse_rule(rule)?);
        }
    }

    Ok(ParsedAsg { name, inputs, rules })
}

fn parse_rule(entry: &Yaml) -> Result<ParsedRule, SyntaxError> {
    let level = entry["level"]
        .as_i64()
        .ok_or_else(|| err("rule entry missing `level`"))? as u32;
    let access_name = entry["access"]
        .as_str()
        .ok_or_else(|| err("rule entry missing `access`"))?;
    let access: AccessRight = access_name
        .parse()
        .map_err(|_| err(format!("unknown access keyword `{access_name}`")))?;
    let trap_write = entry["trapwrite"].as_bool().unwrap_or(false);

    let uags = string_list(&entry["uags"]);
    let hags = string_list(&entry["hags"]);
    let methods = string_list(&entry["methods"]);
    let authorities = string_list(&entry["authorities"]);
    let calc = entry["calc"].as_str().map(|s| s.to_owned());

    let is_tls_required = match entry["tls"].as_bool() {
        Some(true) => Tristate::True,
        Some(false) => Tristate::False,
        None => Tristate::Unset,
    };

    // Duplicate method/authority detection happens once, uniformly for both
    // surface syntaxes, in `model::PolicyModel::from_parsed` — checking it
    // here too would let this front end diverge on which error variant a
    // duplicate produces.
    Ok(ParsedRule {
        level,
        access,
        trap_write,
        uags,
        hags,
        methods,
        authorities,
        calc,
        is_tls_required,
    })
}

fn string_list(node: &Yaml) -> Vec<String> {
    node.as_vec()
        .map(|v| {
            v.iter()
                .filter_map(|e| e.as_str().map(|s| s.to_owned()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let source = r#"
version: 1
asgs:
  - name: DEFAULT
    rules:
      - level: 0
        access: NONE
"#;
        let file = parse(source, &HashMap::new()).unwrap();
        assert_eq!(file.asgs.len(), 1);
        assert_eq!(file.asgs[0].name, "DEFAULT");
        assert_eq!(file.asgs[0].rules[0].access, AccessRight::None);
    }

    #[test]
    fn parses_groups_and_rule_clauses() {
        let source = r#"
uags:
  - name: bar
    users: [alice, bob]
hags:
  - name: foo
    hosts: [localhost]
asgs:
  - name: rw
    rules:
      - level: 1
        access: WRITE
        trapwrite: true
        hags: [foo]
        calc: "A"
"#;
        let file = parse(source, &HashMap::new()).unwrap();
        assert_eq!(file.uags[0].members, vec!["alice", "bob"]);
        assert_eq!(file.hags[0].members, vec!["localhost"]);
        let rule = &file.asgs[0].rules[0];
        assert!(rule.trap_write);
        assert_eq!(rule.hags, vec!["foo"]);
        assert_eq!(rule.calc.as_deref(), Some("A"));
    }

    #[test]
    fn rejects_duplicate_method_within_rule() {
        // The grammar layer accepts this; duplicate method/authority
        // detection happens once, uniformly for both surface syntaxes, in
        // `model::PolicyModel::from_parsed`.
        let source = r#"
asgs:
  - name: foo
    rules:
      - level: 0
        access: NONE
        methods: [x509, x509]
"#;
        let parsed = parse(source, &HashMap::new()).unwrap();
        let err = crate::model::PolicyModel::from_parsed(
            parsed,
            &crate::calc::SimpleCalc,
            &crate::host_match::SystemResolver,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::Error::DupMethod { .. }));
    }

    #[test]
    fn missing_asgs_key_fails() {
        assert!(parse("version: 1\n", &HashMap::new()).is_err());
    }

    /// `method_auth_config_yaml` from aslibtest.c: UAG/HAG entries use
    /// `users`/`hosts`, not a generic `members` key. A wrong key here
    /// would silently parse every group to zero members.
    #[test]
    fn parses_the_real_method_auth_config_yaml_fixture() {
        let source = r#"
version: 1.0
uags:
  - name: foo
    users:
      - testing
  - name: bar
    users:
      - boss
  - name: ops
    users:
      - geek
hags:
  - name: local
    hosts:
      - 127.0.0.1
      - localhost
      - 192.168.0.11
  - name: admin
    hosts:
      - admin.intranet.com
asgs:
  - name: DEFAULT
    rules:
      - level: 0
        access: NONE
        trapwrite: false
  - name: ro
    rules:
      - level: 0
        access: NONE
      - level: 1
        access: READ
        trapwrite: false
        uags:
          - foo
          - ops
        methods:
          - ca
  - name: rw
    rules:
      - level: 0
        access: NONE
      - level: 1
        access: WRITE
        trapwrite: true
        uags:
          - foo
        methods:
          - x509
        authorities:
          - Epics Org CA
  - name: rwx
    rules:
      - level: 0
        access: NONE
      - level: 1
        access: RPC
        trapwrite: true
        uags:
          - bar
        hags:
          - local
        methods:
          - x509
          - ignored
          - ignored_too
        authorities:
          - Epics Org CA
          - ORNL Org CA
"#;
        let file = parse(source, &HashMap::new()).unwrap();

        let foo = file.uags.iter().find(|g| g.name == "foo").unwrap();
        assert_eq!(foo.members, vec!["testing"]);
        let bar = file.uags.iter().find(|g| g.name == "bar").unwrap();
        assert_eq!(bar.members, vec!["boss"]);

        let local = file.hags.iter().find(|g| g.name == "local").unwrap();
        assert_eq!(local.members, vec!["127.0.0.1", "localhost", "192.168.0.11"]);

        let ro = file.asgs.iter().find(|a| a.name == "ro").unwrap();
        assert_eq!(ro.rules[1].uags, vec!["foo", "ops"]);
        assert_eq!(ro.rules[1].methods, vec!["ca"]);

        let rwx = file.asgs.iter().find(|a| a.name == "rwx").unwrap();
        assert_eq!(rwx.rules[1].hags, vec!["local"]);
        assert_eq!(rwx.rules[1].authorities, vec!["Epics Org CA", "ORNL Org CA"]);
    }
}
