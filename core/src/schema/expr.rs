//! Parsed expression trees attached to defaults, checks, generated
//! columns and partial-index predicates.
//!
//! The deparsed text next to a tree is authoritative; the tree exists so
//! callers can inspect an expression without re-parsing it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum ExprNode {
    /// Number, string, boolean or NULL literal, as written.
    Literal { value: String },
    /// Column or other identifier reference, possibly qualified.
    Identifier { name: String },
    /// Function call; arguments are kept as their rendered text.
    Function { name: String, args: String },
    /// `expr::type` or `CAST(expr AS type)`.
    Cast {
        expr: Box<ExprNode>,
        data_type: String,
    },
    Binary {
        op: String,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    Unary { op: String, expr: Box<ExprNode> },
    IsNull { expr: Box<ExprNode>, negated: bool },
    /// Parenthesized expression.
    Nested { expr: Box<ExprNode> },
    /// Anything without a dedicated variant.
    Raw { text: String },
}

impl ExprNode {
    /// Strip casts and parentheses, returning the innermost expression.
    pub fn peel(&self) -> &ExprNode {
        match self {
            ExprNode::Cast { expr, .. } | ExprNode::Nested { expr } => expr.peel(),
            other => other,
        }
    }

    /// Name of the called function if the (peeled) expression is a call.
    pub fn function_name(&self) -> Option<&str> {
        match self.peel() {
            ExprNode::Function { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peel_casts() {
        let node = ExprNode::Cast {
            expr: Box::new(ExprNode::Nested {
                expr: Box::new(ExprNode::Function {
                    name: "now".into(),
                    args: "()".into(),
                }),
            }),
            data_type: "TIMESTAMP".into(),
        };
        assert_eq!(node.function_name(), Some("now"));
    }
}
