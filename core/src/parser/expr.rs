//! Expressions through the SQL grammar: canonical text plus an [`ExprNode`] tree.

use sqlparser::ast::Expr;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::schema::ExprNode;

/// A deparsed expression and its tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExpr {
    pub text: String,
    pub tree: ExprNode,
}

/// Parse `text` as a standalone expression.
///
/// Text the grammar rejects is kept verbatim with a [`ExprNode::Raw`] tree;
/// PostgreSQL itself is the final judge when the DDL runs.
pub fn parse_expression(text: &str) -> ParsedExpr {
    let trimmed = text.trim();
    let dialect = PostgreSqlDialect {};
    let parsed = Parser::new(&dialect)
        .try_with_sql(trimmed)
        .and_then(|mut p| p.parse_expr());
    match parsed {
        Ok(expr) => from_ast(&expr),
        Err(e) => {
            tracing::debug!(expression = trimmed, error = %e, "expression kept verbatim");
            ParsedExpr {
                text: trimmed.to_string(),
                tree: ExprNode::Raw {
                    text: trimmed.to_string(),
                },
            }
        }
    }
}

/// Deparse an already parsed expression.
pub fn from_ast(expr: &Expr) -> ParsedExpr {
    ParsedExpr {
        text: expr.to_string(),
        tree: to_node(expr),
    }
}

fn boxed(expr: &Expr) -> Box<ExprNode> {
    Box::new(to_node(expr))
}

/// Map grammar nodes onto the tagged tree. Unhandled nodes keep their text.
pub fn to_node(expr: &Expr) -> ExprNode {
    match expr {
        Expr::Identifier(ident) => ExprNode::Identifier {
            name: ident.value.clone(),
        },
        Expr::CompoundIdentifier(parts) => ExprNode::Identifier {
            name: parts
                .iter()
                .map(|p| p.value.as_str())
                .collect::<Vec<_>>()
                .join("."),
        },
        Expr::Value(value) => ExprNode::Literal {
            value: value.to_string(),
        },
        Expr::Function(function) => {
            let name = function.name.to_string();
            let rendered = function.to_string();
            let args = rendered
                .strip_prefix(name.as_str())
                .unwrap_or(rendered.as_str())
                .to_string();
            ExprNode::Function { name, args }
        }
        Expr::Cast {
            expr, data_type, ..
        } => ExprNode::Cast {
            expr: boxed(expr),
            data_type: data_type.to_string(),
        },
        Expr::BinaryOp { left, op, right } => ExprNode::Binary {
            op: op.to_string(),
            left: boxed(left),
            right: boxed(right),
        },
        Expr::UnaryOp { op, expr } => ExprNode::Unary {
            op: op.to_string(),
            expr: boxed(expr),
        },
        Expr::IsNull(inner) => ExprNode::IsNull {
            expr: boxed(inner),
            negated: false,
        },
        Expr::IsNotNull(inner) => ExprNode::IsNull {
            expr: boxed(inner),
            negated: true,
        },
        Expr::Nested(inner) => ExprNode::Nested {
            expr: boxed(inner),
        },
        other => ExprNode::Raw {
            text: other.to_string(),
        },
    }
}
