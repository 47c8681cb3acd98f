//! Tokenizer for condition expressions

use serde_json::{Number, Value};

use super::ConditionError;

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Number, string, boolean or null literal
    Literal(Value),
    Ident(String),
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Minus,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

/// A token and the character offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl TokenKind {
    /// Short description for error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Literal(Value::String(s)) => format!("string '{}'", s),
            Self::Literal(v) => format!("literal {}", v),
            Self::Ident(name) => format!("identifier '{}'", name),
            Self::And => "'&&'".to_string(),
            Self::Or => "'||'".to_string(),
            Self::Not => "'!'".to_string(),
            Self::Eq => "'=='".to_string(),
            Self::Ne => "'!='".to_string(),
            Self::Lt => "'<'".to_string(),
            Self::Le => "'<='".to_string(),
            Self::Gt => "'>'".to_string(),
            Self::Ge => "'>='".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

/// Split a condition into tokens, always ending with [`TokenKind::Eof`]
pub fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let two = chars.get(pos + 1).copied();
        let kind = match (c, two) {
            ('&', Some('&')) => {
                pos += 2;
                TokenKind::And
            }
            ('|', Some('|')) => {
                pos += 2;
                TokenKind::Or
            }
            ('=', Some('=')) => {
                pos += 2;
                TokenKind::Eq
            }
            ('!', Some('=')) => {
                pos += 2;
                TokenKind::Ne
            }
            ('<', Some('=')) => {
                pos += 2;
                TokenKind::Le
            }
            ('>', Some('=')) => {
                pos += 2;
                TokenKind::Ge
            }
            ('!', _) => {
                pos += 1;
                TokenKind::Not
            }
            ('<', _) => {
                pos += 1;
                TokenKind::Lt
            }
            ('>', _) => {
                pos += 1;
                TokenKind::Gt
            }
            ('-', _) => {
                pos += 1;
                TokenKind::Minus
            }
            ('.', Some(d)) if d.is_ascii_digit() => {
                let (value, end) = lex_number(&chars, pos)?;
                pos = end;
                TokenKind::Literal(value)
            }
            ('.', _) => {
                pos += 1;
                TokenKind::Dot
            }
            ('(', _) => {
                pos += 1;
                TokenKind::LParen
            }
            (')', _) => {
                pos += 1;
                TokenKind::RParen
            }
            ('[', _) => {
                pos += 1;
                TokenKind::LBracket
            }
            (']', _) => {
                pos += 1;
                TokenKind::RBracket
            }
            ('\'' | '"', _) => {
                let (text, end) = lex_string(&chars, pos)?;
                pos = end;
                TokenKind::Literal(Value::String(text))
            }
            (d, _) if d.is_ascii_digit() => {
                let (value, end) = lex_number(&chars, pos)?;
                pos = end;
                TokenKind::Literal(value)
            }
            (a, _) if a.is_alphabetic() || a == '_' => {
                let mut end = pos;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let word: String = chars[pos..end].iter().collect();
                pos = end;
                // After '.', a word is always a field name, even `null` or `and`
                if matches!(tokens.last(), Some(Token { kind: TokenKind::Dot, .. })) {
                    TokenKind::Ident(word)
                } else {
                    keyword(word)
                }
            }
            ('=', _) => {
                return Err(ConditionError::syntax(start, "unexpected '=', did you mean '=='?"))
            }
            (other, _) => {
                return Err(ConditionError::syntax(
                    start,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: chars.len(),
    });
    Ok(tokens)
}

/// Keywords; the capitalized boolean spellings are accepted for older conditions
fn keyword(word: String) -> TokenKind {
    match word.as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" | "True" => TokenKind::Literal(Value::Bool(true)),
        "false" | "False" => TokenKind::Literal(Value::Bool(false)),
        "null" | "None" => TokenKind::Literal(Value::Null),
        _ => TokenKind::Ident(word),
    }
}

fn lex_number(chars: &[char], start: usize) -> Result<(Value, usize), ConditionError> {
    let mut end = start;
    let mut is_float = false;

    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end < chars.len() && chars[end] == '.' {
        is_float = true;
        end += 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < chars.len() && matches!(chars[end], 'e' | 'E') {
        let mut exp = end + 1;
        if exp < chars.len() && matches!(chars[exp], '+' | '-') {
            exp += 1;
        }
        if exp < chars.len() && chars[exp].is_ascii_digit() {
            is_float = true;
            end = exp;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
        }
    }

    let text: String = chars[start..end].iter().collect();
    let invalid = || ConditionError::syntax(start, format!("invalid number '{}'", text));

    if !is_float {
        if let Ok(n) = text.parse::<i64>() {
            return Ok((Value::Number(Number::from(n)), end));
        }
    }

    let f: f64 = text.parse().map_err(|_| invalid())?;
    let number = Number::from_f64(f).ok_or_else(invalid)?;
    Ok((Value::Number(number), end))
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ConditionError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut pos = start + 1;

    while pos < chars.len() {
        match chars[pos] {
            c if c == quote => return Ok((out, pos + 1)),
            '\\' => {
                let escaped = chars
                    .get(pos + 1)
                    .ok_or_else(|| ConditionError::syntax(pos, "unterminated string"))?;
                let resolved = match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' | '\'' | '"' => *escaped,
                    other => {
                        return Err(ConditionError::syntax(
                            pos,
                            format!("unknown escape '\\{}'", other),
                        ))
                    }
                };
                out.push(resolved);
                pos += 2;
            }
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }

    Err(ConditionError::syntax(start, "unterminated string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("== != <= >= < > && || ! -"),
            vec![
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Minus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(
            kinds("input_data['http'].status_code"),
            vec![
                TokenKind::Ident("input_data".to_string()),
                TokenKind::LBracket,
                TokenKind::Literal(json!("http")),
                TokenKind::RBracket,
                TokenKind::Dot,
                TokenKind::Ident("status_code".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"200 2.5 1e3 "a\"b" true False None"#),
            vec![
                TokenKind::Literal(json!(200)),
                TokenKind::Literal(json!(2.5)),
                TokenKind::Literal(json!(1000.0)),
                TokenKind::Literal(json!("a\"b")),
                TokenKind::Literal(json!(true)),
                TokenKind::Literal(json!(false)),
                TokenKind::Literal(Value::Null),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            kinds("not a and b or c"),
            vec![
                TokenKind::Not,
                TokenKind::Ident("a".to_string()),
                TokenKind::And,
                TokenKind::Ident("b".to_string()),
                TokenKind::Or,
                TokenKind::Ident("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_word_after_dot_is_field_name() {
        assert_eq!(
            kinds("a.or.None not"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("or".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("None".to_string()),
                TokenKind::Not,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_errors_carry_position() {
        assert_eq!(
            tokenize("a = 1").unwrap_err(),
            ConditionError::syntax(2, "unexpected '=', did you mean '=='?")
        );
        assert!(matches!(
            tokenize("x == 'open").unwrap_err(),
            ConditionError::Syntax { position: 5, .. }
        ));
        assert!(matches!(
            tokenize("a; b").unwrap_err(),
            ConditionError::Syntax { position: 1, .. }
        ));
    }
}
