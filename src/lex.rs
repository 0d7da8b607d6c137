use pest::Parser;

use crate::error::FormulaError;
use crate::parse::{FormulaParser, Rule};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    String,
    Number,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
    End,
}

impl TokenKind {
    /// Whether a token of this kind can end an operand.
    pub fn ends_operand(self) -> bool {
        matches!(
            self,
            Self::Identifier | Self::String | Self::Number | Self::RParen
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
        )
    }
}

/// A lexeme of the formula source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text, including quotes for string literals.
    pub text: String,
    /// Character offset into the formula.
    pub position: usize,
}

/// Splits `input` into tokens. The returned list always ends with a
/// [`TokenKind::End`] token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut cursor = CharCursor::new(input);
    let mut consumed = 0;
    if let Some(lexed) = FormulaParser::parse(Rule::tokens, input)
        .ok()
        .and_then(|mut pairs| pairs.next())
    {
        consumed = lexed.as_span().end();
        for pair in lexed.into_inner() {
            let kind = match pair.as_rule() {
                Rule::identifier => TokenKind::Identifier,
                Rule::string => TokenKind::String,
                Rule::number => TokenKind::Number,
                Rule::eq => TokenKind::Equal,
                Rule::neq => TokenKind::NotEqual,
                Rule::lt => TokenKind::Less,
                Rule::le => TokenKind::LessEqual,
                Rule::gt => TokenKind::Greater,
                Rule::ge => TokenKind::GreaterEqual,
                Rule::and => TokenKind::And,
                Rule::or => TokenKind::Or,
                Rule::not => TokenKind::Not,
                Rule::lparen => TokenKind::LParen,
                Rule::rparen => TokenKind::RParen,
                Rule::comma => TokenKind::Comma,
                _ => continue,
            };
            tokens.push(Token {
                kind,
                text: pair.as_str().to_string(),
                position: cursor.position(pair.as_span().start()),
            });
        }
    }

    let rest = &input[consumed..];
    let remainder = rest.trim_start_matches([' ', '\t', '\r', '\n']);
    let position = cursor.position(consumed + (rest.len() - remainder.len()));
    match remainder.chars().next() {
        None => {}
        Some('"' | '\'') => return Err(FormulaError::UnterminatedString { position }),
        Some(found) => return Err(FormulaError::UnexpectedCharacter { found, position }),
    }

    tokens.push(Token {
        kind: TokenKind::End,
        text: String::new(),
        position: cursor.position(input.len()),
    });
    Ok(tokens)
}

/// Rejects unbalanced parentheses and formulas nested deeper than `max_depth`.
///
/// Depth counts open parentheses plus the runs of `NOT` prefixes in front of
/// them, which is what bounds recursion in the parser and evaluator.
pub fn check_nesting(tokens: &[Token], max_depth: usize) -> Result<(), FormulaError> {
    // Position of each open parenthesis and the `NOT` run that preceded it.
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut held_nots = 0;
    let mut pending_nots = 0;
    for token in tokens {
        match token.kind {
            TokenKind::Not => pending_nots += 1,
            TokenKind::LParen => {
                open.push((token.position, pending_nots));
                held_nots += pending_nots;
                pending_nots = 0;
            }
            TokenKind::RParen => {
                let (_, nots) = open.pop().ok_or(FormulaError::UnopenedParen {
                    position: token.position,
                })?;
                held_nots -= nots;
                pending_nots = 0;
            }
            _ => pending_nots = 0,
        }
        if open.len() + held_nots + pending_nots > max_depth {
            return Err(FormulaError::TooDeep { limit: max_depth });
        }
    }
    match open.last() {
        Some(&(position, _)) => Err(FormulaError::UnclosedParen { position }),
        None => Ok(()),
    }
}

/// Converts ascending byte offsets into character offsets without rescanning
/// the input from the start each time.
struct CharCursor<'a> {
    input: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            byte: 0,
            chars: 0,
        }
    }

    fn position(&mut self, byte_offset: usize) -> usize {
        match self.input.get(self.byte..byte_offset) {
            Some(skipped) => {
                self.chars += skipped.chars().count();
                self.byte = byte_offset;
                self.chars
            }
            None => char_position(self.input, byte_offset),
        }
    }
}

pub(crate) fn char_position(input: &str, byte_offset: usize) -> usize {
    input
        .get(..byte_offset)
        .map_or(byte_offset, |prefix| prefix.chars().count())
}
