//! Recursive descent parser for rule conditions
//!
//! Precedence, lowest first:
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := not ( "&&" not )*
//! not        := "!" not | comparison
//! comparison := membership ( ("==" | "!=" | "<" | "<=" | ">" | ">=") membership )?
//! membership := postfix ( "in" postfix )?
//! postfix    := primary ( "." method "(" expr ")" )*
//! primary    := integer | "-" integer | string | true | false | null
//!             | identifier | "(" or ")" | "[" ( or ( "," or )* )? "]"
//! ```

use crate::ast::{Expression, Literal};
use crate::error::ParseError;
use crate::lexer::{Lexer, Spanned, Token};
use crate::operators::{ComparisonOperator, LogicalOperator, Predicate};
use regex::Regex;

/// Nesting limit for parentheses, lists and `!` chains
const MAX_DEPTH: usize = 64;

/// Operands in one `&&` or `||` chain
const MAX_OPERANDS: usize = 1024;

pub struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            tokens,
            index: 0,
            depth: 0,
        })
    }

    fn current(&self) -> &Spanned {
        // tokenize() always ends with Eof, and advance() never moves past it
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn current_token(&self) -> &Token {
        &self.current().token
    }

    fn position(&self) -> usize {
        self.current().position
    }

    fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{expected}'")))
        }
    }

    fn unexpected(&self, context: &str) -> ParseError {
        ParseError::new(
            format!("{context}, found {}", self.current_token()),
            self.position(),
        )
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(
                format!("condition nests deeper than {MAX_DEPTH} levels"),
                self.position(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parse a complete condition; trailing tokens are an error.
    pub fn parse(mut self) -> Result<Expression, ParseError> {
        if *self.current_token() == Token::Eof {
            return Err(ParseError::new("condition is empty", 0));
        }
        let expr = self.parse_or_expression()?;
        if *self.current_token() != Token::Eof {
            return Err(self.unexpected("unexpected token after condition"));
        }
        Ok(expr)
    }

    fn parse_or_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_chain(LogicalOperator::Or, Token::Or, Self::parse_and_expression)
    }

    fn parse_and_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_chain(LogicalOperator::And, Token::And, Self::parse_not_expression)
    }

    /// `operand (separator operand)*` as one flat node
    fn parse_chain(
        &mut self,
        operator: LogicalOperator,
        separator: Token,
        operand: fn(&mut Self) -> Result<Expression, ParseError>,
    ) -> Result<Expression, ParseError> {
        let first = operand(self)?;
        if *self.current_token() != separator {
            return Ok(first);
        }

        let mut operands = vec![first];
        while *self.current_token() == separator {
            if operands.len() == MAX_OPERANDS {
                return Err(ParseError::new(
                    format!("more than {MAX_OPERANDS} operands joined by '{operator}'"),
                    self.position(),
                ));
            }
            self.advance();
            operands.push(operand(self)?);
        }

        Ok(Expression::Logical { operator, operands })
    }

    fn parse_not_expression(&mut self) -> Result<Expression, ParseError> {
        if *self.current_token() == Token::Not {
            self.advance();
            self.enter()?;
            let inner = self.parse_not_expression()?;
            self.leave();
            return Ok(Expression::not(inner));
        }
        self.parse_comparison_expression()
    }

    fn comparison_operator(token: &Token) -> Option<ComparisonOperator> {
        match token {
            Token::Equal => Some(ComparisonOperator::Eq),
            Token::NotEqual => Some(ComparisonOperator::Neq),
            Token::LessThan => Some(ComparisonOperator::Lt),
            Token::LessThanEqual => Some(ComparisonOperator::Lte),
            Token::GreaterThan => Some(ComparisonOperator::Gt),
            Token::GreaterThanEqual => Some(ComparisonOperator::Gte),
            _ => None,
        }
    }

    fn parse_comparison_expression(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_membership_expression()?;

        let Some(operator) = Self::comparison_operator(self.current_token()) else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_membership_expression()?;

        if Self::comparison_operator(self.current_token()).is_some() {
            return Err(ParseError::new(
                "comparisons cannot be chained; combine them with '&&'",
                self.position(),
            ));
        }

        Ok(Expression::compare(left, operator, right))
    }

    fn parse_membership_expression(&mut self) -> Result<Expression, ParseError> {
        let needle = self.parse_postfix_expression()?;

        if *self.current_token() != Token::In {
            return Ok(needle);
        }
        self.advance();
        let haystack = self.parse_postfix_expression()?;

        if *self.current_token() == Token::In {
            return Err(self.unexpected("'in' cannot be chained"));
        }

        Ok(Expression::membership(needle, haystack))
    }

    fn parse_postfix_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary_expression()?;

        if *self.current_token() == Token::Dot {
            self.advance();
            let method_position = self.position();
            let Token::Identifier(method) = self.current_token().clone() else {
                return Err(self.unexpected("expected method name after '.'"));
            };
            let predicate = Predicate::from_method(&method).ok_or_else(|| {
                ParseError::new(
                    format!(
                        "unknown method '{method}', expected one of {}",
                        Predicate::METHODS.join(", ")
                    ),
                    method_position,
                )
            })?;
            self.advance();

            self.expect(Token::LeftParen)?;
            if *self.current_token() == Token::RightParen {
                return Err(ParseError::new(
                    format!("{method}() takes exactly one argument"),
                    self.position(),
                ));
            }
            let argument_position = self.position();
            self.enter()?;
            let argument = self.parse_or_expression()?;
            self.leave();
            if *self.current_token() == Token::Comma {
                return Err(ParseError::new(
                    format!("{method}() takes exactly one argument"),
                    self.position(),
                ));
            }
            self.expect(Token::RightParen)?;

            if predicate == Predicate::Matches {
                Self::check_pattern(&argument, argument_position)?;
            }

            expr = Expression::call(expr, predicate, argument);

            // Predicates return booleans, which no predicate accepts
            if *self.current_token() == Token::Dot {
                return Err(self.unexpected("method calls cannot be chained"));
            }
        }

        Ok(expr)
    }

    /// `matches` takes a literal pattern so bad regexes surface at load time.
    fn check_pattern(argument: &Expression, position: usize) -> Result<(), ParseError> {
        let Expression::Literal(Literal::Str(pattern)) = argument else {
            return Err(ParseError::new(
                "matches() requires a string literal pattern",
                position,
            ));
        };
        Regex::new(pattern)
            .map(|_| ())
            .map_err(|e| ParseError::new(format!("invalid pattern {pattern:?}: {e}"), position))
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, ParseError> {
        let position = self.position();
        match self.current_token().clone() {
            Token::Integer(value) => {
                self.advance();
                Ok(Expression::int(value))
            }
            Token::Minus => {
                self.advance();
                if let Token::Integer(value) = self.current_token().clone() {
                    self.advance();
                    Ok(Expression::int(-value))
                } else {
                    Err(self.unexpected("expected integer after '-'"))
                }
            }
            Token::String(value) => {
                self.advance();
                Ok(Expression::string(value))
            }
            Token::True => {
                self.advance();
                Ok(Expression::bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expression::bool(false))
            }
            Token::Null => {
                self.advance();
                Ok(Expression::null())
            }
            Token::Identifier(name) => {
                self.advance();
                Ok(Expression::ident(name))
            }
            Token::LeftParen => {
                self.advance();
                self.enter()?;
                let expr = self.parse_or_expression()?;
                self.leave();
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => {
                self.advance();
                self.enter()?;
                let items = self.parse_list_items()?;
                self.leave();
                Ok(Expression::List(items))
            }
            Token::Eof => Err(ParseError::new("unexpected end of input", position)),
            other => Err(ParseError::new(format!("unexpected token '{other}'"), position)),
        }
    }

    /// Items after '[' up to and including ']'
    fn parse_list_items(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();
        if *self.current_token() == Token::RightBracket {
            self.advance();
            return Ok(items);
        }

        loop {
            items.push(self.parse_or_expression()?);
            match self.current_token().clone() {
                Token::Comma => self.advance(),
                Token::RightBracket => {
                    self.advance();
                    return Ok(items);
                }
                _ => return Err(self.unexpected("expected ',' or ']' in list")),
            }
        }
    }
}

/// Parse a condition string into an expression tree
pub fn parse_condition(input: &str) -> Result<Expression, ParseError> {
    Parser::new(input)?.parse()
}
