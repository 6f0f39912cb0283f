//! Tokenizer for guard and action expressions.

use super::ExprError;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Lexeme {
    Int(i64),
    Double(f64),
    Str(String),
    Ident(String),
    True,
    False,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Spanned {
    pub lexeme: Lexeme,
    pub offset: usize,
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Spanned>, ExprError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).map(|&(_, n)| n);
        let (lexeme, width) = match (c, next) {
            ('&', Some('&')) => (Lexeme::AndAnd, 2),
            ('|', Some('|')) => (Lexeme::OrOr, 2),
            ('=', Some('=')) => (Lexeme::EqEq, 2),
            ('!', Some('=')) => (Lexeme::NotEq, 2),
            ('<', Some('=')) => (Lexeme::Le, 2),
            ('>', Some('=')) => (Lexeme::Ge, 2),
            ('<', _) => (Lexeme::Lt, 1),
            ('>', _) => (Lexeme::Gt, 1),
            ('!', _) => (Lexeme::Not, 1),
            ('(', _) => (Lexeme::LParen, 1),
            (')', _) => (Lexeme::RParen, 1),
            ('{', _) => (Lexeme::LBrace, 1),
            ('}', _) => (Lexeme::RBrace, 1),
            (',', _) => (Lexeme::Comma, 1),
            ('?', _) => (Lexeme::Question, 1),
            (':', _) => (Lexeme::Colon, 1),
            ('+', _) => (Lexeme::Plus, 1),
            ('-', _) => (Lexeme::Minus, 1),
            ('*', _) => (Lexeme::Star, 1),
            ('/', _) => (Lexeme::Slash, 1),
            ('%', _) => (Lexeme::Percent, 1),
            ('"', _) => {
                let (value, consumed) = read_string(&chars, i)?;
                out.push(Spanned {
                    lexeme: Lexeme::Str(value),
                    offset,
                });
                i += consumed;
                continue;
            }
            (d, _) if d.is_ascii_digit() => {
                let (lexeme, consumed) = read_number(&chars, i)?;
                out.push(Spanned { lexeme, offset });
                i += consumed;
                continue;
            }
            (a, _) if a.is_alphabetic() || a == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|&(_, ch)| ch).collect();
                let lexeme = match word.as_str() {
                    "true" => Lexeme::True,
                    "false" => Lexeme::False,
                    _ => Lexeme::Ident(word),
                };
                out.push(Spanned { lexeme, offset });
                continue;
            }
            (other, _) => {
                return Err(ExprError::UnexpectedChar { ch: other, offset });
            }
        };
        out.push(Spanned { lexeme, offset });
        i += width;
    }

    out.push(Spanned {
        lexeme: Lexeme::Eof,
        offset: text.len(),
    });
    Ok(out)
}

fn read_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), ExprError> {
    let offset = chars[start].0;
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            '"' => return Ok((value, i + 1 - start)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|&(_, c)| c)
                    .ok_or(ExprError::UnterminatedString { offset })?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(ExprError::UnterminatedString { offset })
}

fn read_number(chars: &[(usize, char)], start: usize) -> Result<(Lexeme, usize), ExprError> {
    let digit_at = |i: usize| chars.get(i).is_some_and(|&(_, c)| c.is_ascii_digit());
    let mut i = start;
    let mut is_double = false;

    while digit_at(i) {
        i += 1;
    }
    if chars.get(i).is_some_and(|&(_, c)| c == '.') && digit_at(i + 1) {
        is_double = true;
        i += 1;
        while digit_at(i) {
            i += 1;
        }
    }
    if chars.get(i).is_some_and(|&(_, c)| c == 'e' || c == 'E') {
        let mut j = i + 1;
        if chars.get(j).is_some_and(|&(_, c)| c == '+' || c == '-') {
            j += 1;
        }
        if digit_at(j) {
            is_double = true;
            i = j;
            while digit_at(i) {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
    let lexeme = if is_double {
        text.parse::<f64>()
            .map(Lexeme::Double)
            .map_err(|_| ExprError::InvalidNumber { text: text.clone() })?
    } else {
        text.parse::<i64>()
            .map(Lexeme::Int)
            .map_err(|_| ExprError::InvalidNumber { text: text.clone() })?
    };
    Ok((lexeme, i - start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexemes(text: &str) -> Vec<Lexeme> {
        tokenize(text)
            .unwrap()
            .into_iter()
            .map(|s| s.lexeme)
            .collect()
    }

    #[test]
    fn tokenizes_operators_greedily() {
        assert_eq!(
            lexemes("a<=b && !c"),
            vec![
                Lexeme::Ident("a".into()),
                Lexeme::Le,
                Lexeme::Ident("b".into()),
                Lexeme::AndAnd,
                Lexeme::Not,
                Lexeme::Ident("c".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_numbers() {
        assert_eq!(
            lexemes("12 3.5 1e3"),
            vec![
                Lexeme::Int(12),
                Lexeme::Double(3.5),
                Lexeme::Double(1000.0),
                Lexeme::Eof
            ]
        );
    }

    #[test]
    fn identifiers_may_contain_underscores_and_digits() {
        assert_eq!(
            lexemes("in_0_isPresent"),
            vec![Lexeme::Ident("in_0_isPresent".into()), Lexeme::Eof]
        );
    }

    #[test]
    fn strings_support_escapes() {
        assert_eq!(
            lexemes(r#""a\"b""#),
            vec![Lexeme::Str("a\"b".into()), Lexeme::Eof]
        );
        assert!(matches!(
            tokenize("\"open"),
            Err(ExprError::UnterminatedString { offset: 0 })
        ));
    }

    #[test]
    fn rejects_unknown_characters() {
        assert!(matches!(
            tokenize("a # b"),
            Err(ExprError::UnexpectedChar { ch: '#', offset: 2 })
        ));
    }
}
