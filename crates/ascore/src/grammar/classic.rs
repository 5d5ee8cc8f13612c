//! The classic brace-form parser: `UAG(...) {...}`, `HAG(...) {...}`,
//! `ASG(...) { RULE(...) {...} ... }`.

use std::collections::HashMap;

use ascore_shared::{AccessRight, Tristate};

use super::{
    input_letter_index, macros, ParsedAsg, ParsedFile, ParsedGroup, ParsedInputLink, ParsedRule,
    SyntaxError,
};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    String(String),
    Number(u32),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

struct Lexer<'a> {
    chars: Vec<char>,
    positions: &'a [(u32, u32)],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &str, positions: &'a [(u32, u32)]) -> Self {
        Self {
            chars: text.chars().collect(),
            positions,
            pos: 0,
        }
    }

    fn loc(&self, at: usize) -> (u32, u32) {
        self.positions.get(at).copied().unwrap_or((0, 0))
    }

    fn err(&self, at: usize, message: impl Into<String>) -> SyntaxError {
        let (line, column) = self.loc(at);
        SyntaxError {
            line,
            column,
            message: message.into(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Tok, usize)>, SyntaxError> {
        let mut tokens = Vec::new();
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\r' | '\n' => self.pos += 1,
                '#' => {
                    while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
                        self.pos += 1;
                    }
                }
                '(' => {
                    tokens.push((Tok::LParen, self.pos));
                    self.pos += 1;
                }
                ')' => {
                    tokens.push((Tok::RParen, self.pos));
                    self.pos += 1;
                }
                '{' => {
                    tokens.push((Tok::LBrace, self.pos));
                    self.pos += 1;
                }
                '}' => {
                    tokens.push((Tok::RBrace, self.pos));
                    self.pos += 1;
                }
                ',' => {
                    tokens.push((Tok::Comma, self.pos));
                    self.pos += 1;
                }
                '"' => {
                    let start = self.pos;
                    self.pos += 1;
                    let mut value = String::new();
                    loop {
                        if self.pos >= self.chars.len() {
                            return Err(self.err(start, "unterminated string literal"));
                        }
                        let c = self.chars[self.pos];
                        if c == '"' {
                            self.pos += 1;
                            break;
                        }
                        value.push(c);
                        self.pos += 1;
                    }
                    tokens.push((Tok::String(value), start));
                }
                c if c.is_ascii_digit() => {
                    let start = self.pos;
                    let mut value = String::new();
                    while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_digit() {
                        value.push(self.chars[self.pos]);
                        self.pos += 1;
                    }
                    let n: u32 = value
                        .parse()
                        .map_err(|_| self.err(start, format!("invalid number `{value}`")))?;
                    tokens.push((Tok::Number(n), start));
                }
                c if is_ident_char(c) => {
                    let start = self.pos;
                    let mut value = String::new();
                    while self.pos < self.chars.len() && is_ident_char(self.chars[self.pos]) {
                        value.push(self.chars[self.pos]);
                        self.pos += 1;
                    }
                    tokens.push((Tok::Ident(value), start));
                }
                other => {
                    return Err(self.err(self.pos, format!("unexpected character `{other}`")));
                }
            }
        }
        Ok(tokens)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' || c == ':'
}

fn is_inp_keyword(s: &str) -> bool {
    s.len() == 4 && s.starts_with("INP") && s.as_bytes()[3].is_ascii_uppercase()
}

struct Parser<'a> {
    tokens: Vec<(Tok, usize)>,
    positions: &'a [(u32, u32)],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn loc(&self, at: usize) -> (u32, u32) {
        self.positions.get(at).copied().unwrap_or((0, 0))
    }

    fn err(&self, at: usize, message: impl Into<String>) -> SyntaxError {
        let (line, column) = self.loc(at);
        SyntaxError {
            line,
            column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, at)| *at).unwrap_or(usize::MAX)
    }

    fn bump(&mut self) -> Option<(Tok, usize)> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: &Tok) -> Result<(), SyntaxError> {
        match self.bump() {
            Some((tok, _)) if &tok == expected => Ok(()),
            Some((tok, at)) => Err(self.err(at, format!("expected {expected:?}, found {tok:?}"))),
            None => Err(self.err(self.tokens.len(), format!("expected {expected:?}, found end of input"))),
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(), SyntaxError> {
        match self.bump() {
            Some((Tok::Ident(ref s), _)) if s == expected => Ok(()),
            Some((tok, at)) => Err(self.err(at, format!("expected `{expected}`, found {tok:?}"))),
            None => Err(self.err(self.tokens.len(), format!("expected `{expected}`, found end of input"))),
        }
    }

    fn expect_name(&mut self) -> Result<String, SyntaxError> {
        match self.bump() {
            Some((Tok::Ident(s), _)) => Ok(s),
            // `UAG(foo) {"testing"}` quotes member names so they can
            // contain characters an identifier can't (aslibtest.c's
            // method_auth_config quotes every UAG member).
            Some((Tok::String(s), _)) => Ok(s),
            Some((tok, at)) => Err(self.err(at, format!("expected a name, found {tok:?}"))),
            None => Err(self.err(self.tokens.len(), "expected a name, found end of input")),
        }
    }

    fn expect_string(&mut self) -> Result<String, SyntaxError> {
        match self.bump() {
            Some((Tok::String(s), _)) => Ok(s),
            Some((tok, at)) => Err(self.err(at, format!("expected a string literal, found {tok:?}"))),
            None => Err(self.err(self.tokens.len(), "expected a string literal, found end of input")),
        }
    }

    fn expect_number(&mut self) -> Result<u32, SyntaxError> {
        match self.bump() {
            Some((Tok::Number(n), _)) => Ok(n),
            Some((tok, at)) => Err(self.err(at, format!("expected a number, found {tok:?}"))),
            None => Err(self.err(self.tokens.len(), "expected a number, found end of input")),
        }
    }

    fn parse_file(&mut self) -> Result<ParsedFile, SyntaxError> {
        let mut file = ParsedFile::default();
        while let Some(tok) = self.peek() {
            match tok {
                Tok::Ident(kw) if kw == "UAG" => {
                    file.uags.push(self.parse_group("UAG")?);
                }
                Tok::Ident(kw) if kw == "HAG" => {
                    file.hags.push(self.parse_group("HAG")?);
                }
                Tok::Ident(kw) if kw == "ASG" => {
                    file.asgs.push(self.parse_asg()?);
                }
                _ => {
                    let at = self.peek_at();
                    return Err(self.err(at, "expected UAG, HAG, or ASG"));
                }
            }
        }
        Ok(file)
    }

    fn parse_group(&mut self, keyword: &str) -> Result<ParsedGroup, SyntaxError> {
        self.expect_ident(keyword)?;
        self.expect(&Tok::LParen)?;
        let name = self.expect_name()?;
        self.expect(&Tok::RParen)?;
        self.expect(&Tok::LBrace)?;
        let mut members = Vec::new();
        if self.peek() != Some(&Tok::RBrace) {
            members.push(self.expect_name()?);
            while self.peek() == Some(&Tok::Comma) {
                self.bump();
                members.push(self.expect_name()?);
            }
        }
        self.expect(&Tok::RBrace)?;
        Ok(ParsedGroup { name, members })
    }

    fn parse_asg(&mut self) -> Result<ParsedAsg, SyntaxError> {
        self.expect_ident("ASG")?;
        self.expect(&Tok::LParen)?;
        let name = self.expect_name()?;
        self.expect(&Tok::RParen)?;
        self.expect(&Tok::LBrace)?;

        let mut asg = ParsedAsg {
            name,
            ..Default::default()
        };

        while self.peek() != Some(&Tok::RBrace) {
            match self.peek() {
                Some(Tok::Ident(kw)) if is_inp_keyword(kw) => {
                    asg.inputs.push(self.parse_input_link()?);
                }
                Some(Tok::Ident(kw)) if kw == "RULE" => {
                    asg.rules.push(self.parse_rule()?);
                }
                _ => {
                    let at = self.peek_at();
                    return Err(self.err(at, "expected INP or RULE inside ASG body"));
                }
            }
        }
        self.expect(&Tok::RBrace)?;
        Ok(asg)
    }

    fn parse_input_link(&mut self) -> Result<ParsedInputLink, SyntaxError> {
        // `INPA`, `INPB`, ... is a single identifier token: "INP" immediately
        // followed by the one-letter variable name, with no space between.
        let (tok, at) = self.bump().unwrap();
        let keyword = match tok {
            Tok::Ident(s) => s,
            _ => unreachable!("caller only dispatches here on an Ident"),
        };
        let letter = keyword.chars().nth(3).expect("is_inp_keyword checked length");
        let index = input_letter_index(letter)
            .ok_or_else(|| self.err(at, format!("input letter `{letter}` out of range A..L")))?;
        self.expect(&Tok::LParen)?;
        let symbolic_name = self.expect_string()?;
        self.expect(&Tok::RParen)?;
        Ok(ParsedInputLink { index, symbolic_name })
    }

    fn parse_rule(&mut self) -> Result<ParsedRule, SyntaxError> {
        self.expect_ident("RULE")?;
        self.expect(&Tok::LParen)?;
        let level = self.expect_number()?;
        self.expect(&Tok::Comma)?;
        let (access_tok, access_at) = self.bump().ok_or_else(|| self.err(self.tokens.len(), "expected access level"))?;
        let access_name = match access_tok {
            Tok::Ident(s) => s,
            tok => return Err(self.err(access_at, format!("expected access keyword, found {tok:?}"))),
        };
        let access: AccessRight = access_name
            .parse()
            .map_err(|_| self.err(access_at, format!("unknown access keyword `{access_name}`")))?;

        let mut trap_write = false;
        if self.peek() == Some(&Tok::Comma) {
            self.bump();
            let (tok, at) = self.bump().ok_or_else(|| self.err(self.tokens.len(), "expected TRAPWRITE or NOTRAPWRITE"))?;
            match tok {
                Tok::Ident(s) if s == "TRAPWRITE" => trap_write = true,
                Tok::Ident(s) if s == "NOTRAPWRITE" => trap_write = false,
                tok => return Err(self.err(at, format!("expected TRAPWRITE or NOTRAPWRITE, found {tok:?}"))),
            }
        }
        self.expect(&Tok::RParen)?;

        let mut rule = ParsedRule {
            level,
            access,
            trap_write,
            ..Default::default()
        };

        if self.peek() == Some(&Tok::LBrace) {
            self.bump();
            while self.peek() != Some(&Tok::RBrace) {
                self.parse_rule_item(&mut rule)?;
            }
            self.expect(&Tok::RBrace)?;
        }

        Ok(rule)
    }

    fn parse_rule_item(&mut self, rule: &mut ParsedRule) -> Result<(), SyntaxError> {
        let (tok, at) = self.bump().ok_or_else(|| self.err(self.tokens.len(), "expected a rule clause"))?;
        let keyword = match tok {
            Tok::Ident(s) => s,
            tok => return Err(self.err(at, format!("expected a rule clause keyword, found {tok:?}"))),
        };
        self.expect(&Tok::LParen)?;
        match keyword.as_str() {
            // A clause kind can repeat within one rule body (aslibtest.c's
            // method_auth_config has two METHOD(...) and two AUTHORITY(...)
            // clauses on the same rule); every occurrence's names accumulate
            // into one combined set rather than the last occurrence
            // replacing the ones before it.
            "UAG" => rule.uags.extend(self.parse_name_list()?),
            "HAG" => rule.hags.extend(self.parse_name_list()?),
            "METHOD" => rule.methods.extend(self.parse_string_list()?),
            "AUTHORITY" => rule.authorities.extend(self.parse_string_list()?),
            "CALC" => rule.calc = Some(self.expect_string()?),
            "TLS" => {
                let (tok, at) = self.bump().ok_or_else(|| self.err(self.tokens.len(), "expected TRUE or FALSE"))?;
                rule.is_tls_required = match tok {
                    Tok::Ident(s) if s == "TRUE" => Tristate::True,
                    Tok::Ident(s) if s == "FALSE" => Tristate::False,
                    tok => return Err(self.err(at, format!("expected TRUE or FALSE, found {tok:?}"))),
                };
            }
            other => return Err(self.err(at, format!("unknown rule clause `{other}`"))),
        }
        self.expect(&Tok::RParen)?;
        Ok(())
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>, SyntaxError> {
        let mut names = vec![self.expect_name()?];
        while self.peek() == Some(&Tok::Comma) {
            self.bump();
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, SyntaxError> {
        let mut values = vec![self.expect_string()?];
        while self.peek() == Some(&Tok::Comma) {
            self.bump();
            values.push(self.expect_string()?);
        }
        Ok(values)
    }
}

/// Parses classic-form source text, expanding `$(name)` macros from `dict`
/// first so that both syntax errors and the resulting model are identical
/// to what a human would get after manual substitution.
pub fn parse(source: &str, dict: &HashMap<String, String>) -> Result<ParsedFile, SyntaxError> {
    let substituted = macros::substitute(source, dict)?;
    let lexer = Lexer::new(&substituted.text, &substituted.positions);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser {
        tokens,
        positions: &substituted.positions,
        pos: 0,
    };
    parser.parse_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uag_and_hag() {
        let file = parse(
            "UAG(bar) {alice,bob} HAG(foo) {localhost} ASG(DEFAULT){RULE(0,NONE)}",
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(file.uags.len(), 1);
        assert_eq!(file.uags[0].members, vec!["alice", "bob"]);
        assert_eq!(file.hags[0].members, vec!["localhost"]);
    }

    #[test]
    fn parses_rule_with_clauses() {
        let file = parse(
            r#"ASG(rwx){RULE(1,RPC,TRAPWRITE){UAG(bar) METHOD("x509") AUTHORITY("Epics Org CA","ORNL Org CA") CALC("A")}}"#,
            &HashMap::new(),
        )
        .unwrap();
        let rule = &file.asgs[0].rules[0];
        assert_eq!(rule.level, 1);
        assert_eq!(rule.access, AccessRight::Rpc);
        assert!(rule.trap_write);
        assert_eq!(rule.uags, vec!["bar"]);
        assert_eq!(rule.methods, vec!["x509"]);
        assert_eq!(rule.authorities, vec!["Epics Org CA", "ORNL Org CA"]);
        assert_eq!(rule.calc.as_deref(), Some("A"));
    }

    #[test]
    fn reports_line_and_column_on_syntax_error() {
        let err = parse("ASG(foo){RULE(0,NONE)", &HashMap::new()).unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn macro_substitution_runs_before_tokenizing() {
        let mut dict = HashMap::new();
        dict.insert("grp".to_owned(), "bar".to_owned());
        let file = parse("UAG($(grp)) {alice}", &dict).unwrap();
        assert_eq!(file.uags[0].name, "bar");
    }

    #[test]
    fn unterminated_string_fails() {
        let err = parse(r#"ASG(foo){RULE(0,NONE){METHOD("x509)}}"#, &HashMap::new()).unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn input_link_parses() {
        let file = parse(r#"ASG(foo){INPA("signal1") RULE(0,NONE,NOTRAPWRITE){CALC("A")}}"#, &HashMap::new()).unwrap();
        assert_eq!(file.asgs[0].inputs[0].index, 0);
        assert_eq!(file.asgs[0].inputs[0].symbolic_name, "signal1");
    }
}
