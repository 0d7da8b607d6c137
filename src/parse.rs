use crate::error::FormulaError;
use crate::expression::{CompareOp, Expression, LogicalOp};
use crate::lex::{char_position, Token, TokenKind};
use crate::value::ScalarValue;

use once_cell::sync::Lazy;
use pest::error::InputLocation;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to project `src`
pub(crate) struct FormulaParser;

static PRATT_PARSER: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::prefix(Rule::not))
});

/// Parses `input` into an [`Expression`].
///
/// `tokens` must be the output of [`tokenize`](crate::lex::tokenize) for the
/// same input; they are used to describe syntax errors in terms of the
/// offending token.
pub(crate) fn parse(input: &str, tokens: &[Token]) -> Result<Expression, FormulaError> {
    let mut pairs = FormulaParser::parse(Rule::formula, input)
        .map_err(|error| syntax_error(input, tokens, &error))?;
    let expr = pairs
        .next()
        .and_then(|formula| formula.into_inner().next())
        .ok_or(FormulaError::EmptyExpression)?;
    build_expression(expr.into_inner())
}

fn build_expression(pairs: Pairs<Rule>) -> Result<Expression, FormulaError> {
    PRATT_PARSER
        .map_primary(build_comparison)
        .map_prefix(|_not, only| -> Result<Expression, FormulaError> {
            Ok(Expression::Not(Box::new(only?)))
        })
        .map_infix(|lhs, op, rhs| -> Result<Expression, FormulaError> {
            let op = match op.as_rule() {
                Rule::and => LogicalOp::And,
                Rule::or => LogicalOp::Or,
                x => unreachable!("Unexpected logic operator {x:?}"),
            };
            Ok(Expression::Logical {
                op,
                left: Box::new(lhs?),
                right: Box::new(rhs?),
            })
        })
        .parse(pairs)
}

fn build_comparison(pair: Pair<Rule>) -> Result<Expression, FormulaError> {
    let mut inner = pair.into_inner();
    let left = match inner.next() {
        Some(operand) => build_operand(operand)?,
        None => return Err(FormulaError::EmptyExpression),
    };
    match (inner.next(), inner.next()) {
        (Some(op), Some(right)) => Ok(Expression::Compare {
            op: compare_op(&op),
            left: Box::new(left),
            right: Box::new(build_operand(right)?),
        }),
        _ => Ok(left),
    }
}

fn build_operand(pair: Pair<Rule>) -> Result<Expression, FormulaError> {
    match pair.as_rule() {
        Rule::expr => build_expression(pair.into_inner()),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .map(|identifier| identifier.as_str().to_string())
                .unwrap_or_default();
            let args = inner
                .map(|arg| build_expression(arg.into_inner()))
                .collect::<Result<_, _>>()?;
            Ok(Expression::Call { name, args })
        }
        Rule::field => Ok(Expression::FieldRef(pair.as_str().to_string())),
        Rule::string => {
            let value = pair
                .into_inner()
                .next()
                .map_or("", |contents| contents.as_str());
            Ok(Expression::Literal(ScalarValue::String(value.to_string())))
        }
        Rule::number => {
            // The grammar only admits literals that `f64` parses.
            let value = pair.as_str().parse::<f64>().unwrap_or_default();
            Ok(Expression::Literal(ScalarValue::Number(value)))
        }
        Rule::true_literal => Ok(Expression::Literal(ScalarValue::Boolean(true))),
        Rule::false_literal => Ok(Expression::Literal(ScalarValue::Boolean(false))),
        Rule::null_literal => Ok(Expression::Literal(ScalarValue::Null)),
        x => unreachable!("Unexpected operand rule {x:?}"),
    }
}

fn compare_op(pair: &Pair<Rule>) -> CompareOp {
    match pair.as_rule() {
        Rule::eq => CompareOp::Equal,
        Rule::neq => CompareOp::NotEqual,
        Rule::lt => CompareOp::Less,
        Rule::le => CompareOp::LessEqual,
        Rule::gt => CompareOp::Greater,
        Rule::ge => CompareOp::GreaterEqual,
        x => unreachable!("Unexpected comparison operator {x:?}"),
    }
}

/// Describes a grammar failure by the token at which parsing stopped.
fn syntax_error(
    input: &str,
    tokens: &[Token],
    error: &pest::error::Error<Rule>,
) -> FormulaError {
    let byte_offset = match error.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let position = char_position(input, byte_offset);
    let Some(index) = tokens.iter().position(|token| token.position >= position) else {
        return FormulaError::UnexpectedEnd {
            position: tokens.last().map_or(position, |end| end.position),
        };
    };
    let token = &tokens[index];
    match token.kind {
        TokenKind::End => FormulaError::UnexpectedEnd {
            position: token.position,
        },
        kind if kind.is_comparison() && index > 0 && tokens[index - 1].kind.ends_operand() => {
            FormulaError::ChainedComparison {
                position: token.position,
            }
        }
        _ => FormulaError::UnexpectedToken {
            token: token.text.clone(),
            position: token.position,
        },
    }
}
