//! AST evaluation over frames, single rows, and bound series.

use serde_json::{Number, Value};

use crate::error::{ExprError, ExprResult};
use crate::frame::{compare_values, Frame};

use super::{BinaryOp, Expr, UnaryOp};

const ELEMENTWISE_FNS: &[&str] = &["abs", "sqrt", "log", "exp", "floor", "ceil", "round"];
const REDUCTION_FNS: &[&str] = &["sum", "mean", "min", "max", "count", "std", "median"];
const SERIES_FNS: &[&str] = &["shift", "diff", "cumsum", "pct_change", "rolling_mean"];

pub(crate) fn is_series_or_elementwise_fn(name: &str) -> bool {
    SERIES_FNS.contains(&name) || ELEMENTWISE_FNS.contains(&name) || REDUCTION_FNS.contains(&name)
}

/// Where identifiers resolve during evaluation.
enum Ctx<'a> {
    /// Identifiers are whole columns; results may be columns or scalars.
    Frame(&'a Frame),
    /// Identifiers are one row's cells; series helpers and reductions are
    /// rejected.
    Row(&'a Frame, usize),
    /// `x` is the bound input column.
    Series(&'a [Value]),
}

impl Ctx<'_> {
    fn len(&self) -> usize {
        match self {
            Ctx::Frame(frame) => frame.n_rows(),
            Ctx::Row(..) => 1,
            Ctx::Series(values) => values.len(),
        }
    }

    fn is_row(&self) -> bool {
        matches!(self, Ctx::Row(..))
    }
}

/// An evaluation result: either one value for every row, or a whole column.
enum Ev {
    Scalar(Value),
    Column(Vec<Value>),
}

impl Ev {
    fn into_column(self, len: usize) -> Vec<Value> {
        match self {
            Ev::Scalar(v) => vec![v; len],
            Ev::Column(vs) => vs,
        }
    }
}

// =============================================================================
// Entry points
// =============================================================================

pub(crate) fn eval_mask(src: &str, ast: &Expr, frame: &Frame) -> ExprResult<Vec<bool>> {
    let ctx = Ctx::Frame(frame);
    let out = eval(src, ast, &ctx)?;
    let not_boolean = || ExprError::NotBoolean {
        expr: src.to_string(),
    };
    match out {
        Ev::Scalar(Value::Bool(b)) => Ok(vec![b; frame.n_rows()]),
        Ev::Scalar(_) => Err(not_boolean()),
        Ev::Column(values) => values
            .into_iter()
            .map(|v| match v {
                Value::Bool(b) => Ok(b),
                Value::Null => Ok(false),
                _ => Err(not_boolean()),
            })
            .collect(),
    }
}

pub(crate) fn eval_values(src: &str, ast: &Expr, frame: &Frame) -> ExprResult<Vec<Value>> {
    let ctx = Ctx::Frame(frame);
    Ok(eval(src, ast, &ctx)?.into_column(frame.n_rows()))
}

pub(crate) fn eval_row(src: &str, ast: &Expr, frame: &Frame, row: usize) -> ExprResult<Value> {
    let ctx = Ctx::Row(frame, row);
    match eval(src, ast, &ctx)? {
        Ev::Scalar(v) => Ok(v),
        Ev::Column(_) => Err(type_err(src, "row-wise evaluation produced a column")),
    }
}

pub(crate) fn eval_series(src: &str, ast: &Expr, values: &[Value]) -> ExprResult<Vec<Value>> {
    let ctx = Ctx::Series(values);
    Ok(eval(src, ast, &ctx)?.into_column(values.len()))
}

pub(crate) fn eval_series_scalar(src: &str, ast: &Expr, values: &[Value]) -> ExprResult<Value> {
    let ctx = Ctx::Series(values);
    match eval(src, ast, &ctx)? {
        Ev::Scalar(v) => Ok(v),
        Ev::Column(_) => Err(type_err(src, "reduction must produce a scalar")),
    }
}

/// Validate that an expression is a usable series callable: it must
/// reference the bound identifier `x` and nothing else.
pub(crate) fn check_series_shape(src: &str, ast: &Expr) -> ExprResult<()> {
    let mut idents = Vec::new();
    collect_idents(ast, &mut idents);
    if idents.is_empty() || idents.iter().any(|&name| name != "x" && name != "index") {
        return Err(ExprError::NotCallable {
            expr: src.to_string(),
        });
    }
    Ok(())
}

fn collect_idents<'a>(ast: &'a Expr, out: &mut Vec<&'a str>) {
    match ast {
        Expr::Ident(name) => out.push(name),
        Expr::Unary { operand, .. } => collect_idents(operand, out),
        Expr::Binary { left, right, .. } => {
            collect_idents(left, out);
            collect_idents(right, out);
        }
        Expr::In { needle, haystack } => {
            collect_idents(needle, out);
            for item in haystack {
                collect_idents(item, out);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_idents(arg, out);
            }
        }
        _ => {}
    }
}

// =============================================================================
// Core evaluation
// =============================================================================

fn type_err(src: &str, message: impl Into<String>) -> ExprError {
    ExprError::Type {
        expr: src.to_string(),
        message: message.into(),
    }
}

fn num_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn as_f64(src: &str, v: &Value, what: &str) -> ExprResult<Option<f64>> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        other => Err(type_err(src, format!("{what} is not numeric: {other}"))),
    }
}

fn as_bool(src: &str, v: &Value) -> ExprResult<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(type_err(src, format!("expected boolean, got {other}"))),
    }
}

fn eval(src: &str, ast: &Expr, ctx: &Ctx) -> ExprResult<Ev> {
    match ast {
        Expr::Number(n) => Ok(Ev::Scalar(num_value(*n))),
        Expr::Str(s) => Ok(Ev::Scalar(Value::String(s.clone()))),
        Expr::Bool(b) => Ok(Ev::Scalar(Value::Bool(*b))),
        Expr::Null => Ok(Ev::Scalar(Value::Null)),
        Expr::Ident(name) => eval_ident(src, name, ctx),
        Expr::Unary { op, operand } => {
            let inner = eval(src, operand, ctx)?;
            map_unary(src, *op, inner)
        }
        Expr::Binary { op, left, right } => {
            let lhs = eval(src, left, ctx)?;
            let rhs = eval(src, right, ctx)?;
            zip_binary(src, *op, lhs, rhs)
        }
        Expr::In { needle, haystack } => {
            let needle = eval(src, needle, ctx)?;
            let mut items = Vec::with_capacity(haystack.len());
            for item in haystack {
                match eval(src, item, ctx)? {
                    Ev::Scalar(v) => items.push(v),
                    Ev::Column(_) => {
                        return Err(type_err(src, "membership list items must be literals"))
                    }
                }
            }
            map_values(needle, |v| {
                Value::Bool(items.iter().any(|item| values_equal(item, &v)))
            })
        }
        Expr::Call { name, args } => eval_call(src, name, args, ctx),
    }
}

fn eval_ident(src: &str, name: &str, ctx: &Ctx) -> ExprResult<Ev> {
    let unknown = || ExprError::UnknownColumn {
        expr: src.to_string(),
        name: name.to_string(),
    };
    match ctx {
        Ctx::Frame(frame) => {
            if name == "index" {
                return Ok(Ev::Column(
                    frame.index().iter().map(|&id| Value::from(id)).collect(),
                ));
            }
            frame
                .column(name)
                .map(|values| Ev::Column(values.to_vec()))
                .ok_or_else(unknown)
        }
        Ctx::Row(frame, row) => {
            if name == "index" {
                return Ok(Ev::Scalar(Value::from(frame.index()[*row])));
            }
            frame
                .cell(name, *row)
                .map(|v| Ev::Scalar(v.clone()))
                .ok_or_else(unknown)
        }
        Ctx::Series(values) => match name {
            "x" => Ok(Ev::Column(values.to_vec())),
            "index" => Ok(Ev::Column(
                (0..values.len() as i64).map(Value::from).collect(),
            )),
            _ => Err(unknown()),
        },
    }
}

fn map_values(input: Ev, f: impl Fn(Value) -> Value) -> ExprResult<Ev> {
    Ok(match input {
        Ev::Scalar(v) => Ev::Scalar(f(v)),
        Ev::Column(vs) => Ev::Column(vs.into_iter().map(f).collect()),
    })
}

fn try_map_values(input: Ev, f: impl Fn(Value) -> ExprResult<Value>) -> ExprResult<Ev> {
    Ok(match input {
        Ev::Scalar(v) => Ev::Scalar(f(v)?),
        Ev::Column(vs) => Ev::Column(vs.into_iter().map(f).collect::<ExprResult<_>>()?),
    })
}

fn map_unary(src: &str, op: UnaryOp, input: Ev) -> ExprResult<Ev> {
    match op {
        UnaryOp::Neg => try_map_values(input, |v| {
            Ok(match as_f64(src, &v, "negation operand")? {
                Some(f) => num_value(-f),
                None => Value::Null,
            })
        }),
        UnaryOp::Not => try_map_values(input, |v| Ok(Value::Bool(!as_bool(src, &v)?))),
    }
}

/// Combine two results elementwise, broadcasting scalars over columns.
fn zip_binary(src: &str, op: BinaryOp, lhs: Ev, rhs: Ev) -> ExprResult<Ev> {
    let apply = |a: &Value, b: &Value| apply_binary(src, op, a, b);
    match (lhs, rhs) {
        (Ev::Scalar(a), Ev::Scalar(b)) => Ok(Ev::Scalar(apply(&a, &b)?)),
        (Ev::Scalar(a), Ev::Column(bs)) => Ok(Ev::Column(
            bs.iter().map(|b| apply(&a, b)).collect::<ExprResult<_>>()?,
        )),
        (Ev::Column(avs), Ev::Scalar(b)) => Ok(Ev::Column(
            avs.iter().map(|a| apply(a, &b)).collect::<ExprResult<_>>()?,
        )),
        (Ev::Column(avs), Ev::Column(bvs)) => Ok(Ev::Column(
            avs.iter()
                .zip(bvs.iter())
                .map(|(a, b)| apply(a, b))
                .collect::<ExprResult<_>>()?,
        )),
    }
}

fn apply_binary(src: &str, op: BinaryOp, a: &Value, b: &Value) -> ExprResult<Value> {
    match op {
        BinaryOp::Add => {
            // String concatenation when both sides are strings.
            if let (Value::String(x), Value::String(y)) = (a, b) {
                return Ok(Value::String(format!("{x}{y}")));
            }
            arith(src, a, b, |x, y| Some(x + y))
        }
        BinaryOp::Sub => arith(src, a, b, |x, y| Some(x - y)),
        BinaryOp::Mul => arith(src, a, b, |x, y| Some(x * y)),
        BinaryOp::Div => arith(src, a, b, |x, y| (y != 0.0).then(|| x / y)),
        BinaryOp::Mod => arith(src, a, b, |x, y| (y != 0.0).then(|| x % y)),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(a, b))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(a, b))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if a.is_null() || b.is_null() {
                return Ok(Value::Bool(false));
            }
            if !comparable(a, b) {
                return Err(type_err(
                    src,
                    format!("cannot order {a} against {b}"),
                ));
            }
            let ord = compare_values(a, b, true);
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::And => Ok(Value::Bool(as_bool(src, a)? && as_bool(src, b)?)),
        BinaryOp::Or => Ok(Value::Bool(as_bool(src, a)? || as_bool(src, b)?)),
    }
}

fn arith(
    src: &str,
    a: &Value,
    b: &Value,
    f: impl Fn(f64, f64) -> Option<f64>,
) -> ExprResult<Value> {
    let (x, y) = (
        as_f64(src, a, "left operand")?,
        as_f64(src, b, "right operand")?,
    );
    Ok(match (x, y) {
        (Some(x), Some(y)) => f(x, y).map(num_value).unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // Numeric equality through f64 so 1 == 1.0.
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

// =============================================================================
// Function calls
// =============================================================================

fn arity(name: &str, expected: &str, args: &[Expr]) -> ExprResult<()> {
    let bounds: Vec<usize> = expected
        .split('-')
        .filter_map(|part| part.parse().ok())
        .collect();
    let (lo, hi) = match bounds.as_slice() {
        [n] => (*n, *n),
        [lo, hi] => (*lo, *hi),
        _ => (args.len(), args.len()),
    };
    if args.len() < lo || args.len() > hi {
        return Err(ExprError::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            got: args.len(),
        });
    }
    Ok(())
}

fn eval_call(src: &str, name: &str, args: &[Expr], ctx: &Ctx) -> ExprResult<Ev> {
    if name == "if" {
        arity(name, "3", args)?;
        let cond = eval(src, &args[0], ctx)?.into_column(ctx.len());
        let then = eval(src, &args[1], ctx)?.into_column(ctx.len());
        let other = eval(src, &args[2], ctx)?.into_column(ctx.len());
        let mut out = Vec::with_capacity(cond.len());
        for ((c, t), o) in cond.iter().zip(then).zip(other) {
            out.push(if as_bool(src, c)? { t } else { o });
        }
        return Ok(if ctx.is_row() {
            Ev::Scalar(out.into_iter().next().unwrap_or(Value::Null))
        } else {
            Ev::Column(out)
        });
    }

    if name == "matches" {
        arity(name, "2", args)?;
        let pattern = match eval(src, &args[1], ctx)? {
            Ev::Scalar(Value::String(p)) => p,
            _ => return Err(type_err(src, "matches() pattern must be a string literal")),
        };
        let re = regex::Regex::new(&pattern)
            .map_err(|e| type_err(src, format!("invalid pattern: {e}")))?;
        let input = eval(src, &args[0], ctx)?;
        return map_values(input, |v| {
            Value::Bool(matches!(&v, Value::String(s) if re.is_match(s)))
        });
    }

    if ELEMENTWISE_FNS.contains(&name) {
        let expected = if name == "round" { "1-2" } else { "1" };
        arity(name, expected, args)?;
        let digits = match args.get(1) {
            Some(arg) => match eval(src, arg, ctx)? {
                Ev::Scalar(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as i32,
                _ => return Err(type_err(src, "round() digits must be a number literal")),
            },
            None => 0,
        };
        let input = eval(src, &args[0], ctx)?;
        let fname = name.to_string();
        return try_map_values(input, move |v| {
            Ok(match as_f64(src, &v, "function argument")? {
                Some(f) => num_value(elementwise(&fname, f, digits)),
                None => Value::Null,
            })
        });
    }

    if REDUCTION_FNS.contains(&name) {
        if ctx.is_row() {
            return Err(type_err(
                src,
                format!("'{name}' is not available in row-wise evaluation"),
            ));
        }
        arity(name, "1", args)?;
        let values = eval(src, &args[0], ctx)?.into_column(ctx.len());
        return Ok(Ev::Scalar(reduce(src, name, &values)?));
    }

    if SERIES_FNS.contains(&name) {
        if ctx.is_row() {
            return Err(type_err(
                src,
                format!("'{name}' is not available in row-wise evaluation"),
            ));
        }
        return eval_series_fn(src, name, args, ctx);
    }

    Err(ExprError::UnknownFunction {
        expr: src.to_string(),
        name: name.to_string(),
    })
}

fn elementwise(name: &str, f: f64, digits: i32) -> f64 {
    match name {
        "abs" => f.abs(),
        "sqrt" => f.sqrt(),
        "log" => f.ln(),
        "exp" => f.exp(),
        "floor" => f.floor(),
        "ceil" => f.ceil(),
        "round" => {
            let scale = 10f64.powi(digits);
            (f * scale).round() / scale
        }
        _ => unreachable!("allow-list covers all elementwise functions"),
    }
}

/// Reduce a column to one value, skipping nulls.
pub(crate) fn reduce(src: &str, name: &str, values: &[Value]) -> ExprResult<Value> {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    match name {
        "count" => Ok(Value::from(present.len() as i64)),
        "min" | "max" => {
            let mut best: Option<&Value> = None;
            for v in &present {
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let take = compare_values(v, b, true).is_lt() == (name == "min");
                        if take {
                            v
                        } else {
                            b
                        }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
        "first" => Ok(present.first().map(|v| (*v).clone()).unwrap_or(Value::Null)),
        "last" => Ok(present.last().map(|v| (*v).clone()).unwrap_or(Value::Null)),
        "nunique" => {
            let mut seen: Vec<&Value> = Vec::new();
            for v in &present {
                if !seen.iter().any(|s| values_equal(s, v)) {
                    seen.push(v);
                }
            }
            Ok(Value::from(seen.len() as i64))
        }
        "sum" | "mean" | "std" | "median" => {
            let mut nums = Vec::with_capacity(present.len());
            for v in &present {
                if let Some(f) = as_f64(src, v, &format!("'{name}' input"))? {
                    nums.push(f);
                }
            }
            Ok(match name {
                "sum" => num_value(nums.iter().sum()),
                "mean" => {
                    if nums.is_empty() {
                        Value::Null
                    } else {
                        num_value(nums.iter().sum::<f64>() / nums.len() as f64)
                    }
                }
                "std" => {
                    if nums.len() < 2 {
                        Value::Null
                    } else {
                        let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                        let var = nums.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                            / (nums.len() - 1) as f64;
                        num_value(var.sqrt())
                    }
                }
                _ => {
                    // median
                    if nums.is_empty() {
                        Value::Null
                    } else {
                        let mut sorted = nums.clone();
                        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                        let mid = sorted.len() / 2;
                        if sorted.len() % 2 == 1 {
                            num_value(sorted[mid])
                        } else {
                            num_value((sorted[mid - 1] + sorted[mid]) / 2.0)
                        }
                    }
                }
            })
        }
        _ => Err(ExprError::UnknownFunction {
            expr: src.to_string(),
            name: name.to_string(),
        }),
    }
}

fn int_arg(src: &str, name: &str, arg: &Expr, ctx: &Ctx) -> ExprResult<i64> {
    match eval(src, arg, ctx)? {
        Ev::Scalar(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| type_err(src, format!("'{name}' offset must be an integer"))),
        _ => Err(type_err(src, format!("'{name}' offset must be an integer"))),
    }
}

fn eval_series_fn(src: &str, name: &str, args: &[Expr], ctx: &Ctx) -> ExprResult<Ev> {
    let expected = match name {
        "shift" | "rolling_mean" => "2",
        "diff" => "1-2",
        _ => "1",
    };
    arity(name, expected, args)?;
    let values = eval(src, &args[0], ctx)?.into_column(ctx.len());
    let n = values.len();

    let out = match name {
        "shift" => {
            let offset = int_arg(src, name, &args[1], ctx)?;
            (0..n as i64)
                .map(|i| {
                    let j = i - offset;
                    if (0..n as i64).contains(&j) {
                        values[j as usize].clone()
                    } else {
                        Value::Null
                    }
                })
                .collect()
        }
        "diff" => {
            let offset = match args.get(1) {
                Some(arg) => int_arg(src, name, arg, ctx)?,
                None => 1,
            };
            let mut out = Vec::with_capacity(n);
            for i in 0..n as i64 {
                let j = i - offset;
                let prev = if (0..n as i64).contains(&j) {
                    as_f64(src, &values[j as usize], "'diff' input")?
                } else {
                    None
                };
                let cur = as_f64(src, &values[i as usize], "'diff' input")?;
                out.push(match (cur, prev) {
                    (Some(c), Some(p)) => num_value(c - p),
                    _ => Value::Null,
                });
            }
            out
        }
        "cumsum" => {
            let mut total = 0.0;
            let mut out = Vec::with_capacity(n);
            for v in &values {
                match as_f64(src, v, "'cumsum' input")? {
                    Some(f) => {
                        total += f;
                        out.push(num_value(total));
                    }
                    None => out.push(Value::Null),
                }
            }
            out
        }
        "pct_change" => {
            let mut out = Vec::with_capacity(n);
            let mut prev: Option<f64> = None;
            for v in &values {
                let cur = as_f64(src, v, "'pct_change' input")?;
                out.push(match (cur, prev) {
                    (Some(c), Some(p)) if p != 0.0 => num_value((c - p) / p),
                    _ => Value::Null,
                });
                if cur.is_some() {
                    prev = cur;
                }
            }
            out
        }
        _ => {
            // rolling_mean
            let window = int_arg(src, name, &args[1], ctx)?;
            if window < 1 {
                return Err(type_err(src, "'rolling_mean' window must be >= 1"));
            }
            let window = window as usize;
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                if i + 1 < window {
                    out.push(Value::Null);
                    continue;
                }
                let mut sum = 0.0;
                let mut full = true;
                for v in &values[i + 1 - window..=i] {
                    match as_f64(src, v, "'rolling_mean' input")? {
                        Some(f) => sum += f,
                        None => {
                            full = false;
                            break;
                        }
                    }
                }
                out.push(if full {
                    num_value(sum / window as f64)
                } else {
                    Value::Null
                });
            }
            out
        }
    };
    Ok(Ev::Column(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reduce_skips_nulls() {
        let values = vec![json!(1), Value::Null, json!(3)];
        assert_eq!(reduce("t", "sum", &values).unwrap(), json!(4.0));
        assert_eq!(reduce("t", "count", &values).unwrap(), json!(2));
        assert_eq!(reduce("t", "mean", &values).unwrap(), json!(2.0));
    }

    #[test]
    fn test_reduce_empty_inputs() {
        let none: Vec<Value> = vec![Value::Null];
        assert_eq!(reduce("t", "sum", &none).unwrap(), json!(0.0));
        assert_eq!(reduce("t", "mean", &none).unwrap(), Value::Null);
        assert_eq!(reduce("t", "min", &none).unwrap(), Value::Null);
        assert_eq!(reduce("t", "count", &none).unwrap(), json!(0));
    }

    #[test]
    fn test_reduce_std_and_median() {
        let values = vec![json!(2), json!(4), json!(4), json!(4), json!(5), json!(5), json!(7), json!(9)];
        let std = reduce("t", "std", &values).unwrap();
        assert!((std.as_f64().unwrap() - 2.138089935).abs() < 1e-6);
        assert_eq!(reduce("t", "median", &values).unwrap(), json!(4.5));
        assert_eq!(
            reduce("t", "median", &[json!(1), json!(3), json!(10)]).unwrap(),
            json!(3.0)
        );
    }

    #[test]
    fn test_reduce_min_max_on_strings() {
        let values = vec![json!("pear"), json!("apple"), json!("plum")];
        assert_eq!(reduce("t", "min", &values).unwrap(), json!("apple"));
        assert_eq!(reduce("t", "max", &values).unwrap(), json!("plum"));
    }

    #[test]
    fn test_reduce_first_last_nunique() {
        let values = vec![Value::Null, json!("a"), json!("b"), json!("a")];
        assert_eq!(reduce("t", "first", &values).unwrap(), json!("a"));
        assert_eq!(reduce("t", "last", &values).unwrap(), json!("a"));
        assert_eq!(reduce("t", "nunique", &values).unwrap(), json!(2));
    }

    #[test]
    fn test_values_equal_coerces_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_pct_change() {
        let out = eval_series(
            "pct_change(x)",
            &Expr::Call {
                name: "pct_change".into(),
                args: vec![Expr::Ident("x".into())],
            },
            &[json!(100), json!(110), json!(99)],
        )
        .unwrap();
        assert_eq!(out[0], Value::Null);
        assert!((out[1].as_f64().unwrap() - 0.1).abs() < 1e-9);
        assert!((out[2].as_f64().unwrap() + 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_mean_requires_full_window() {
        let ast = Expr::Call {
            name: "rolling_mean".into(),
            args: vec![Expr::Ident("x".into()), Expr::Number(2.0)],
        };
        let out = eval_series("rolling_mean(x, 2)", &ast, &[json!(1), json!(3), Value::Null, json!(5)])
            .unwrap();
        assert_eq!(out, vec![Value::Null, json!(2.0), Value::Null, Value::Null]);
    }

    #[test]
    fn test_negative_shift_looks_ahead() {
        let ast = Expr::Call {
            name: "shift".into(),
            args: vec![Expr::Ident("x".into()), Expr::Number(-1.0)],
        };
        let out = eval_series("shift(x, -1)", &ast, &[json!(1), json!(2), json!(3)]).unwrap();
        assert_eq!(out, vec![json!(2), json!(3), Value::Null]);
    }
}
