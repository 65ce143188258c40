use crate::runtime::EvalError;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Words that may never be used as identifiers in an expression.
pub const RESERVED: &[&str] = &[
    "in", "of", "new", "var", "let", "const", "function", "return", "if", "else", "for", "while",
    "do", "class", "this", "delete", "void", "instanceof", "with", "switch", "case", "break",
    "continue", "throw", "try", "catch", "finally", "yield", "await", "async",
];

const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=",
    "=>", "(", ")", "[", "]", "{", "}", ".", ",", ";", ":", "?", "+", "-", "*", "/", "%", "<",
    ">", "=", "!",
];

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut tokens = Tokenizer::new(input);
    let mut out = Vec::new();
    while let Some(t) = tokens.next_token()? {
        out.push(t);
    }
    Ok(out)
}

/// Identifier tokens of an expression in order of appearance, without
/// duplicates, reserved words or member names after a `.`.
///
/// Scanning stops quietly at the first lexical error, so unparsable sources
/// such as `dog in dogs` still report `dog` and `dogs`.
pub fn identifiers(input: &str) -> Vec<String> {
    let mut tokens = Tokenizer::new(input);
    let mut out: Vec<String> = Vec::new();
    let mut after_dot = false;
    while let Ok(Some(t)) = tokens.next_token() {
        match t.token {
            Token::Ident(name) => {
                if !after_dot && !RESERVED.contains(&name.as_str()) && !out.contains(&name) {
                    out.push(name);
                }
                after_dot = false;
            }
            Token::Punct(".") => after_dot = true,
            _ => after_dot = false,
        }
    }
    out
}

struct Tokenizer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, EvalError> {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }

        let Some(&(offset, c)) = self.chars.peek() else {
            return Ok(None);
        };

        let token = match c {
            '\'' | '"' => self.read_string(offset, c)?,
            _ if c.is_ascii_digit() => self.read_number(offset)?,
            '.' if self.next_is_digit(offset) => self.read_number(offset)?,
            _ if is_ident_start(c) => self.read_ident(),
            _ => self.read_punct(offset)?,
        };
        Ok(Some(Spanned { token, offset }))
    }

    fn next_is_digit(&self, offset: usize) -> bool {
        self.input[offset + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn read_string(&mut self, offset: usize, quote: char) -> Result<Token, EvalError> {
        self.chars.next();
        let mut s = String::new();
        while let Some((_, c)) = self.chars.next() {
            if c == quote {
                return Ok(Token::Str(s));
            }
            if c != '\\' {
                s.push(c);
                continue;
            }
            let Some((_, escaped)) = self.chars.next() else {
                break;
            };
            match escaped {
                'n' => s.push('\n'),
                't' => s.push('\t'),
                'r' => s.push('\r'),
                '0' => s.push('\0'),
                'u' => {
                    let hex: String = (0..4).filter_map(|_| self.chars.next().map(|(_, h)| h)).collect();
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| EvalError::syntax(offset, "invalid unicode escape"))?;
                    s.push(ch);
                }
                other => s.push(other),
            }
        }
        Err(EvalError::syntax(offset, "unterminated string"))
    }

    fn read_number(&mut self, offset: usize) -> Result<Token, EvalError> {
        let mut end = offset;
        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(&(i, c)) = self.chars.peek() {
            let accept = c.is_ascii_digit()
                || (c == '.' && !seen_dot && !seen_exp)
                || ((c == 'e' || c == 'E') && !seen_exp)
                || ((c == '+' || c == '-')
                    && seen_exp
                    && matches!(self.input[..i].chars().last(), Some('e' | 'E')));
            if !accept {
                break;
            }
            if c == '.' {
                seen_dot = true;
            }
            if c == 'e' || c == 'E' {
                seen_exp = true;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        let text = &self.input[offset..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| EvalError::syntax(offset, format!("invalid number '{text}'")))
    }

    fn read_ident(&mut self) -> Token {
        let mut s = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if is_ident_continue(c) {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Ident(s)
    }

    fn read_punct(&mut self, offset: usize) -> Result<Token, EvalError> {
        let rest = &self.input[offset..];
        let Some(p) = PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) else {
            let c = rest.chars().next().unwrap_or('?');
            return Err(EvalError::syntax(offset, format!("unexpected character '{c}'")));
        };
        for _ in 0..p.chars().count() {
            self.chars.next();
        }
        Ok(Token::Punct(p))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .expect("tokenizes")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("count += 1.5"),
            vec![
                Token::Ident("count".into()),
                Token::Punct("+="),
                Token::Number(1.5),
            ]
        );
    }

    #[test]
    fn test_longest_punctuator_wins() {
        assert_eq!(
            kinds("a !== b"),
            vec![
                Token::Ident("a".into()),
                Token::Punct("!=="),
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(kinds(r#"'it\'s' "a\nb""#), vec![
            Token::Str("it's".into()),
            Token::Str("a\nb".into()),
        ]);
        assert!(tokenize("'open").is_err());
    }

    #[test]
    fn test_identifiers_skip_members_and_keywords() {
        assert_eq!(identifiers("dog in dogs"), vec!["dog", "dogs"]);
        assert_eq!(identifiers("$refs.input.value + name"), vec!["$refs", "name"]);
        assert_eq!(identifiers("a + a # b"), vec!["a"]);
    }
}
