//! Functions every registry starts with.
//!
//! Built-ins receive their arguments unevaluated. The evaluator has already
//! checked the minimum argument count, so `arg` only falls back to `null`
//! for optional trailing arguments.

use crate::ast::Expr;
use crate::eval::Evaluator;
use crate::registry::BuiltinFn;
use crate::value::{Context, Value};

/// `(name, minimum argument count, implementation)`
pub(crate) const CATALOGUE: &[(&str, usize, BuiltinFn)] = &[
    ("eq", 2, eq),
    ("ne", 2, ne),
    ("gt", 2, gt),
    ("lt", 2, lt),
    ("gte", 2, gte),
    ("lte", 2, lte),
    ("and", 1, and),
    ("or", 1, or),
    ("not", 1, not),
    ("lowercase", 1, lowercase),
    ("uppercase", 1, uppercase),
    ("trim", 1, trim),
    ("truncate", 2, truncate),
    ("replace", 3, replace),
    ("limit", 2, limit),
    ("first", 1, first),
    ("last", 1, last),
    ("length", 1, length),
    ("join", 2, join),
    ("default", 2, default),
];

const TRUNCATE_SUFFIX: &str = "...";

fn arg(ev: &Evaluator<'_>, args: &[&Expr], i: usize, ctx: &Context<'_>) -> Value {
    args.get(i).map_or(Value::Null, |expr| ev.evaluate(expr, ctx))
}

/// A count argument: NaN and negatives become 0, fractions round down.
fn count_arg(ev: &Evaluator<'_>, args: &[&Expr], i: usize, ctx: &Context<'_>) -> usize {
    let n = arg(ev, args, i, ctx).to_number();
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        n.floor() as usize
    }
}

// ── Comparison ──────────────────────────────────────────────────────

fn eq(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    Value::Bool(arg(ev, args, 0, ctx) == arg(ev, args, 1, ctx))
}

fn ne(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    Value::Bool(arg(ev, args, 0, ctx) != arg(ev, args, 1, ctx))
}

fn compare(
    ev: &Evaluator<'_>,
    args: &[&Expr],
    ctx: &Context<'_>,
    op: fn(f64, f64) -> bool,
) -> Value {
    let left = arg(ev, args, 0, ctx).to_number();
    let right = arg(ev, args, 1, ctx).to_number();
    Value::Bool(op(left, right))
}

fn gt(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    compare(ev, args, ctx, |a, b| a > b)
}

fn lt(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    compare(ev, args, ctx, |a, b| a < b)
}

fn gte(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    compare(ev, args, ctx, |a, b| a >= b)
}

fn lte(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    compare(ev, args, ctx, |a, b| a <= b)
}

// ── Logic ───────────────────────────────────────────────────────────

/// First falsy operand, or the last one. Later operands are not evaluated.
fn and(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    let mut last = Value::Null;
    for expr in args {
        last = ev.evaluate(expr, ctx);
        if !last.is_truthy() {
            break;
        }
    }
    last
}

/// First truthy operand, or the last one. Later operands are not evaluated.
fn or(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    let mut last = Value::Null;
    for expr in args {
        last = ev.evaluate(expr, ctx);
        if last.is_truthy() {
            break;
        }
    }
    last
}

fn not(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    Value::Bool(!arg(ev, args, 0, ctx).is_truthy())
}

/// The first operand if truthy, else the second.
fn default(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    let value = arg(ev, args, 0, ctx);
    if value.is_truthy() {
        value
    } else {
        arg(ev, args, 1, ctx)
    }
}

// ── Strings ─────────────────────────────────────────────────────────

fn lowercase(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    Value::String(arg(ev, args, 0, ctx).to_output_string().to_lowercase())
}

fn uppercase(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    Value::String(arg(ev, args, 0, ctx).to_output_string().to_uppercase())
}

fn trim(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    Value::String(arg(ev, args, 0, ctx).to_output_string().trim().to_string())
}

/// `truncate(s, n[, suffix])`: strings longer than `n` characters keep the
/// first `n` and get `suffix` (default `...`) appended.
fn truncate(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    let s = arg(ev, args, 0, ctx).to_output_string();
    let limit = arg(ev, args, 1, ctx).to_number();
    let suffix = if args.len() > 2 {
        arg(ev, args, 2, ctx).to_output_string()
    } else {
        TRUNCATE_SUFFIX.to_string()
    };

    let len = s.chars().count();
    if limit.is_nan() || len as f64 <= limit {
        return Value::String(s);
    }
    let keep = if limit <= 0.0 { 0 } else { limit.floor() as usize };
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(&suffix);
    Value::String(out)
}

/// `replace(s, from, to)`: every literal occurrence.
fn replace(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    let s = arg(ev, args, 0, ctx).to_output_string();
    let from = arg(ev, args, 1, ctx).to_output_string();
    let to = arg(ev, args, 2, ctx).to_output_string();
    Value::String(s.replace(&from, &to))
}

// ── Sequences ───────────────────────────────────────────────────────

fn limit(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    let value = arg(ev, args, 0, ctx);
    let n = count_arg(ev, args, 1, ctx);
    match value {
        Value::Array(mut items) => {
            items.truncate(n);
            Value::Array(items)
        }
        other => other,
    }
}

fn first(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    match arg(ev, args, 0, ctx) {
        Value::Array(items) => items.into_iter().next().unwrap_or_default(),
        other => other,
    }
}

fn last(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    match arg(ev, args, 0, ctx) {
        Value::Array(items) => items.into_iter().next_back().unwrap_or_default(),
        other => other,
    }
}

fn length(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    match arg(ev, args, 0, ctx) {
        Value::Array(items) => Value::from(items.len()),
        other => Value::from(other.to_output_string().chars().count()),
    }
}

fn join(ev: &Evaluator<'_>, args: &[&Expr], ctx: &Context<'_>) -> Value {
    let value = arg(ev, args, 0, ctx);
    let separator = arg(ev, args, 1, ctx).to_output_string();
    match value {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(Value::to_output_string)
                .collect::<Vec<_>>()
                .join(&separator),
        ),
        other => Value::String(other.to_output_string()),
    }
}
