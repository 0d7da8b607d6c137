use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::value::ScalarValue;

/// Parsed formula syntax tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    // Constant.
    Literal(ScalarValue),

    // Record lookup by exact field name.
    FieldRef(String),

    // Function call; arity is checked when the call is evaluated.
    Call { name: String, args: Vec<Expression> },

    // Unary logic.
    Not(Box<Expression>),

    // Binary comparison. Never chained: operands are never themselves
    // unparenthesized comparisons.
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    // Binary logic.
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
        }
    }

    /// Whether `ordering` of the left operand relative to the right satisfies
    /// this operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::Less => ordering == Ordering::Less,
            Self::LessEqual => ordering != Ordering::Greater,
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterEqual => ordering != Ordering::Less,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl Expression {
    /// Names of every record field the expression reads, in sorted order.
    pub fn field_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_field_names(&mut names);
        names
    }

    fn collect_field_names(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::FieldRef(name) => {
                names.insert(name.clone());
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_field_names(names);
                }
            }
            Self::Not(only) => only.collect_field_names(names),
            Self::Compare { left, right, .. } | Self::Logical { left, right, .. } => {
                left.collect_field_names(names);
                right.collect_field_names(names);
            }
        }
    }
}
