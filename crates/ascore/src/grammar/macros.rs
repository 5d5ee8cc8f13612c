//! Textual macro substitution (`$(name)`), run as a pre-lexing pass per the
//! design note that it "must preserve line/column for errors": every output
//! character still maps back to the source line/column it came from (or, for
//! expanded text, the line/column of the `$(` that introduced it), so a
//! syntax error discovered after substitution reports a position a human
//! reading the original file would recognize.

use std::collections::HashMap;

use super::SyntaxError;

#[derive(Debug)]
pub struct Substituted {
    pub text: String,
    /// `positions[i]` is the (line, column) in the original source that
    /// produced `text`'s i-th byte.
    pub positions: Vec<(u32, u32)>,
}

pub fn substitute(
    source: &str,
    dict: &HashMap<String, String>,
) -> Result<Substituted, SyntaxError> {
    let mut text = String::with_capacity(source.len());
    let mut positions = Vec::with_capacity(source.len());
    let mut line = 1u32;
    let mut column = 1u32;

    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '$' && chars.get(i + 1) == Some(&'(') {
            let start_line = line;
            let start_column = column;
            let mut j = i + 2;
            while j < chars.len() && chars[j] != ')' {
                j += 1;
            }
            if j >= chars.len() {
                return Err(SyntaxError {
                    line: start_line,
                    column: start_column,
                    message: "unterminated macro substitution".to_owned(),
                });
            }
            let name: String = chars[i + 2..j].iter().collect();
            let replacement = dict.get(&name).ok_or_else(|| SyntaxError {
                line: start_line,
                column: start_column,
                message: format!("undefined macro `{name}`"),
            })?;
            for ch in replacement.chars() {
                text.push(ch);
                positions.push((start_line, start_column));
            }
            for _ in i..=j {
                advance(chars[i], &mut line, &mut column);
                i += 1;
            }
            continue;
        }

        text.push(c);
        positions.push((line, column));
        advance(c, &mut line, &mut column);
        i += 1;
    }

    Ok(Substituted { text, positions })
}

fn advance(c: char, line: &mut u32, column: &mut u32) {
    if c == '\n' {
        *line += 1;
        *column = 1;
    } else {
        *column += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_macro() {
        let mut dict = HashMap::new();
        dict.insert("host".to_owned(), "localhost".to_owned());
        let result = substitute("HAG(foo) {$(host)}", &dict).unwrap();
        assert_eq!(result.text, "HAG(foo) {localhost}");
    }

    #[test]
    fn unknown_macro_reports_position() {
        let dict = HashMap::new();
        let err = substitute("HAG(foo) {$(missing)}", &dict).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 11);
    }

    #[test]
    fn position_table_tracks_original_lines_after_substitution() {
        let mut dict = HashMap::new();
        dict.insert("x".to_owned(), "yy".to_owned());
        let result = substitute("A\n$(x)B", &dict).unwrap();
        // 'A', '\n', 'y', 'y', 'B'
        assert_eq!(result.positions[0], (1, 1));
        assert_eq!(result.positions[2].0, 2);
    }
}
