//! Tokenizer for rule conditions
//!
//! Positions are character offsets into the condition source and are carried
//! into every `ParseError`.

use crate::error::ParseError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // Literals
    Integer(i64),
    String(String),
    True,
    False,
    Null,

    Identifier(String),
    In,

    // Operators
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
    Not,
    Minus,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{n}"),
            Token::String(s) => write!(f, "{s:?}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::In => write!(f, "in"),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::LessThanEqual => write!(f, "<="),
            Token::GreaterThan => write!(f, ">"),
            Token::GreaterThanEqual => write!(f, ">="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Minus => write!(f, "-"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// A token and the offset it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    /// Tokenize the whole input; the last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        let mut number = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.' && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(ParseError::new(
                    "decimal literals are not supported; amounts are integer cents",
                    start,
                ));
            } else {
                break;
            }
        }

        number
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| ParseError::new(format!("integer literal {number} out of range"), start))
    }

    fn read_string(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.position;
        let mut string = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance();
                return Ok(Token::String(string));
            } else if ch == '\\' {
                self.advance();
                match self.current_char {
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some('\\') => string.push('\\'),
                    Some('"') => string.push('"'),
                    Some('\'') => string.push('\''),
                    Some(other) => {
                        string.push('\\');
                        string.push(other);
                    }
                    None => break,
                }
                self.advance();
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(ParseError::new("unterminated string literal", start))
    }

    fn read_identifier(&mut self) -> Token {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match identifier.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            _ => Token::Identifier(identifier),
        }
    }

    /// Consume a one- or two-character operator
    fn operator(&mut self, second: char, double: Token, single: Option<Token>) -> Result<Token, ParseError> {
        let start = self.position;
        let first = self.current_char.unwrap_or_default();
        if self.peek() == Some(second) {
            self.advance();
            self.advance();
            return Ok(double);
        }
        match single {
            Some(token) => {
                self.advance();
                Ok(token)
            }
            None => Err(ParseError::new(
                format!("unexpected character '{first}', did you mean '{first}{second}'?"),
                start,
            )),
        }
    }

    fn single(&mut self, token: Token) -> Result<Token, ParseError> {
        self.advance();
        Ok(token)
    }

    pub fn next_token(&mut self) -> Result<Spanned, ParseError> {
        self.skip_whitespace();
        let position = self.position;

        let token = match self.current_char {
            None => Token::Eof,
            Some(ch) => match ch {
                '0'..='9' => self.read_number()?,
                '"' | '\'' => self.read_string(ch)?,
                'a'..='z' | 'A'..='Z' | '_' => self.read_identifier(),
                '=' => self.operator('=', Token::Equal, None)?,
                '!' => self.operator('=', Token::NotEqual, Some(Token::Not))?,
                '<' => self.operator('=', Token::LessThanEqual, Some(Token::LessThan))?,
                '>' => self.operator('=', Token::GreaterThanEqual, Some(Token::GreaterThan))?,
                '&' => self.operator('&', Token::And, None)?,
                '|' => self.operator('|', Token::Or, None)?,
                '-' => self.single(Token::Minus)?,
                '(' => self.single(Token::LeftParen)?,
                ')' => self.single(Token::RightParen)?,
                '[' => self.single(Token::LeftBracket)?,
                ']' => self.single(Token::RightBracket)?,
                ',' => self.single(Token::Comma)?,
                '.' => self.single(Token::Dot)?,
                _ => {
                    return Err(ParseError::new(
                        format!("unexpected character '{ch}'"),
                        position,
                    ));
                }
            },
        };

        Ok(Spanned { token, position })
    }
}
