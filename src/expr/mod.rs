//! Closed-grammar expression language for conditions and value expressions.
//!
//! Expressions reference dataset columns as bare identifiers (plus the
//! `index` pseudo-column holding the row id) and support arithmetic,
//! comparison and boolean operators, membership tests (`x in [1, 2]`), and a
//! fixed allow-list of helper functions. There is no general code-execution
//! hook: every expression is parsed into an AST and evaluated by this
//! module.
//!
//! Three evaluation shapes:
//!
//! - [`CompiledExpr::eval_mask`] - boolean row selection over a frame
//! - [`CompiledExpr::eval_values`] / [`CompiledExpr::eval_row`] - vectorized
//!   or row-wise value computation
//! - [`SeriesFn`] - a sequence-to-sequence callable over a single column,
//!   written either as a bare helper name (`"diff"`) or as an expression
//!   over the bound identifier `x` (`"x - shift(x, 1)"`)
//!
//! ## Function allow-list
//!
//! | Group | Functions |
//! |---|---|
//! | elementwise | `abs, sqrt, log, exp, floor, ceil, round` |
//! | conditional | `if(cond, a, b)` |
//! | text | `matches(col, "pattern")` |
//! | reductions | `sum, mean, min, max, count, std, median` |
//! | series | `shift(x, n)`, `diff(x[, n])`, `cumsum(x)`, `pct_change(x)`, `rolling_mean(x, n)` |

mod eval;
mod parser;

use serde_json::Value;

use crate::error::{ExprError, ExprResult};
use crate::frame::Frame;

pub(crate) use eval::reduce;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    /// Column reference (or `index`, or the series binding `x`).
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Membership test against a literal list.
    In {
        needle: Box<Expr>,
        haystack: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A compiled expression, retaining its source text for error reporting.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    src: String,
    ast: Expr,
}

impl CompiledExpr {
    /// Parse an expression string.
    pub fn compile(src: &str) -> ExprResult<Self> {
        let ast = parser::parse(src)?;
        Ok(CompiledExpr {
            src: src.to_string(),
            ast,
        })
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.src
    }

    /// Evaluate as a row-selection condition over the whole frame.
    ///
    /// The result must be boolean per row; null counts as false.
    pub fn eval_mask(&self, frame: &Frame) -> ExprResult<Vec<bool>> {
        eval::eval_mask(&self.src, &self.ast, frame)
    }

    /// Evaluate vectorized over a (sub-)frame; a scalar result broadcasts
    /// over the frame's rows.
    pub fn eval_values(&self, frame: &Frame) -> ExprResult<Vec<Value>> {
        eval::eval_values(&self.src, &self.ast, frame)
    }

    /// Evaluate row-wise with every column bound to that row's scalar.
    /// Reductions and series helpers are rejected in this mode.
    pub fn eval_row(&self, frame: &Frame, row: usize) -> ExprResult<Value> {
        eval::eval_row(&self.src, &self.ast, frame, row)
    }
}

/// A resolved sequence-to-sequence callable over one column.
#[derive(Debug, Clone)]
pub struct SeriesFn {
    src: String,
    ast: Expr,
}

impl SeriesFn {
    /// Resolve a series-callable expression.
    ///
    /// Accepts a bare allow-listed function name (rewritten to `name(x)`)
    /// or an expression over the bound identifier `x`. Anything else fails
    /// with [`ExprError::NotCallable`].
    pub fn resolve(src: &str) -> ExprResult<Self> {
        let trimmed = src.trim();
        if trimmed.is_empty() {
            return Err(ExprError::NotCallable {
                expr: src.to_string(),
            });
        }
        let ast = parser::parse(trimmed)?;
        let ast = match ast {
            Expr::Ident(name) if eval::is_series_or_elementwise_fn(&name) => Expr::Call {
                name,
                args: vec![Expr::Ident("x".to_string())],
            },
            other => other,
        };
        eval::check_series_shape(trimmed, &ast)?;
        Ok(SeriesFn {
            src: trimmed.to_string(),
            ast,
        })
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.src
    }

    /// Apply to a column, producing a column of the same length. A scalar
    /// result (e.g. a reduction over `x`) broadcasts.
    pub fn apply(&self, values: &[Value]) -> ExprResult<Vec<Value>> {
        eval::eval_series(&self.src, &self.ast, values)
    }

    /// Apply to a column, requiring a scalar result. Used for
    /// caller-supplied aggregate reductions.
    pub fn apply_scalar(&self, values: &[Value]) -> ExprResult<Value> {
        eval::eval_series_scalar(&self.src, &self.ast, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::frame_of;
    use serde_json::json;

    fn numbers() -> Frame {
        frame_of(&[("x", vec![json!(-1), json!(2), json!(3)])])
    }

    #[test]
    fn test_mask_comparison() {
        let expr = CompiledExpr::compile("x > 0").unwrap();
        assert_eq!(expr.eval_mask(&numbers()).unwrap(), vec![false, true, true]);
    }

    #[test]
    fn test_mask_index_pseudo_column() {
        let expr = CompiledExpr::compile("index > -1").unwrap();
        assert_eq!(expr.eval_mask(&numbers()).unwrap(), vec![true, true, true]);
    }

    #[test]
    fn test_mask_boolean_connectives() {
        let expr = CompiledExpr::compile("x > 0 and x < 3").unwrap();
        assert_eq!(expr.eval_mask(&numbers()).unwrap(), vec![false, true, false]);
        let expr = CompiledExpr::compile("not (x > 0) or x == 3").unwrap();
        assert_eq!(expr.eval_mask(&numbers()).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_mask_membership() {
        let frame = frame_of(&[(
            "tier",
            vec![json!("gold"), json!("silver"), json!("bronze")],
        )]);
        let expr = CompiledExpr::compile("tier in ['gold', 'silver']").unwrap();
        assert_eq!(expr.eval_mask(&frame).unwrap(), vec![true, true, false]);
    }

    #[test]
    fn test_mask_requires_boolean() {
        let expr = CompiledExpr::compile("x + 1").unwrap();
        assert!(matches!(
            expr.eval_mask(&numbers()),
            Err(ExprError::NotBoolean { .. })
        ));
    }

    #[test]
    fn test_values_arithmetic() {
        let expr = CompiledExpr::compile("x * 2 + 1").unwrap();
        assert_eq!(
            expr.eval_values(&numbers()).unwrap(),
            vec![json!(-1.0), json!(5.0), json!(7.0)]
        );
    }

    #[test]
    fn test_values_null_propagates() {
        let frame = frame_of(&[("x", vec![json!(1), Value::Null])]);
        let expr = CompiledExpr::compile("x + 1").unwrap();
        assert_eq!(
            expr.eval_values(&frame).unwrap(),
            vec![json!(2.0), Value::Null]
        );
    }

    #[test]
    fn test_values_division_by_zero_is_null() {
        let frame = frame_of(&[("x", vec![json!(1), json!(0)])]);
        let expr = CompiledExpr::compile("10 / x").unwrap();
        assert_eq!(
            expr.eval_values(&frame).unwrap(),
            vec![json!(10.0), Value::Null]
        );
    }

    #[test]
    fn test_values_conditional_selection() {
        // if() selects cells, it does not rewrite them: the original integer
        // cells come through untouched, only the literal branch is numeric.
        let expr = CompiledExpr::compile("if(x > 0, x, 0)").unwrap();
        assert_eq!(
            expr.eval_values(&numbers()).unwrap(),
            vec![json!(0.0), json!(2), json!(3)]
        );
        let strings = frame_of(&[("s", vec![json!("keep"), Value::Null])]);
        let expr = CompiledExpr::compile("if(s == 'keep', s, 'other')").unwrap();
        assert_eq!(
            expr.eval_values(&strings).unwrap(),
            vec![json!("keep"), json!("other")]
        );
    }

    #[test]
    fn test_values_reduction_broadcasts() {
        let expr = CompiledExpr::compile("x - mean(x)").unwrap();
        // mean([-1, 2, 3]) = 4/3
        let out = expr.eval_values(&numbers()).unwrap();
        let centered: Vec<f64> = out.iter().map(|v| v.as_f64().unwrap()).collect();
        assert!((centered[0] - (-1.0 - 4.0 / 3.0)).abs() < 1e-9);
        assert!((centered[2] - (3.0 - 4.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_row_mode_scalar() {
        let expr = CompiledExpr::compile("x * 10").unwrap();
        assert_eq!(expr.eval_row(&numbers(), 1).unwrap(), json!(20.0));
    }

    #[test]
    fn test_row_mode_rejects_reductions() {
        let expr = CompiledExpr::compile("mean(x)").unwrap();
        assert!(matches!(
            expr.eval_row(&numbers(), 0),
            Err(ExprError::Type { .. })
        ));
    }

    #[test]
    fn test_unknown_column() {
        let expr = CompiledExpr::compile("nope > 1").unwrap();
        assert!(matches!(
            expr.eval_mask(&numbers()),
            Err(ExprError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_unknown_function() {
        let expr = CompiledExpr::compile("system('rm')");
        let err = match expr {
            Ok(compiled) => compiled.eval_values(&numbers()).unwrap_err(),
            Err(err) => err,
        };
        assert!(matches!(err, ExprError::UnknownFunction { .. }));
    }

    #[test]
    fn test_matches_helper() {
        let frame = frame_of(&[(
            "name",
            vec![json!("alpha-1"), json!("beta-2"), json!("alpha-9")],
        )]);
        let expr = CompiledExpr::compile("matches(name, '^alpha')").unwrap();
        assert_eq!(expr.eval_mask(&frame).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_series_fn_bare_name() {
        let f = SeriesFn::resolve("cumsum").unwrap();
        let out = f.apply(&[json!(1), json!(2), json!(3)]).unwrap();
        assert_eq!(out, vec![json!(1.0), json!(3.0), json!(6.0)]);
    }

    #[test]
    fn test_series_fn_diff_expression() {
        let f = SeriesFn::resolve("x - shift(x, 1)").unwrap();
        let out = f.apply(&[json!(10), json!(12), json!(9)]).unwrap();
        assert_eq!(out, vec![Value::Null, json!(2.0), json!(-3.0)]);
    }

    #[test]
    fn test_series_fn_rejects_non_callable() {
        assert!(matches!(
            SeriesFn::resolve("42"),
            Err(ExprError::NotCallable { .. })
        ));
        assert!(matches!(
            SeriesFn::resolve("some_column + 1"),
            Err(ExprError::NotCallable { .. })
        ));
    }

    #[test]
    fn test_series_fn_scalar_reduction() {
        let f = SeriesFn::resolve("max(x) - min(x)").unwrap();
        let out = f
            .apply_scalar(&[json!(4), json!(10), json!(7)])
            .unwrap();
        assert_eq!(out, json!(6.0));
    }
}
