use crate::ast::*;
use crate::error::InlineError;
use crate::eval::Evaluator;
use crate::registry::Registry;
use crate::value::{Context, Map, Value};

/// Render a parsed tree against `data`, resolving functions in `registry`.
pub fn render(nodes: &[Node], registry: &Registry, data: &Map) -> String {
    let mut out = String::new();
    let ctx = Context::new(data);
    render_nodes(nodes, &Evaluator::new(registry), &ctx, &mut out);
    out
}

/// Append the output of `nodes` to `out`.
pub fn render_nodes(nodes: &[Node], ev: &Evaluator<'_>, ctx: &Context<'_>, out: &mut String) {
    for node in nodes {
        render_node(node, ev, ctx, out);
    }
}

fn render_node(node: &Node, ev: &Evaluator<'_>, ctx: &Context<'_>, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Interpolation { expr, raw } => render_interpolation(expr, *raw, ev, ctx, out),
        Node::If { branches, fallback } => {
            render_if(branches, fallback.as_deref(), ev, ctx, out)
        }
        Node::Each {
            source,
            item,
            index,
            body,
            fallback,
        } => render_each(
            source,
            item,
            index.as_deref(),
            body,
            fallback.as_deref(),
            ev,
            ctx,
            out,
        ),
    }
}

/// `{{ expr }}` / `{{+ expr +}}`
///
/// Sequences and mappings cannot be printed and produce an inline error;
/// `null` prints nothing.
fn render_interpolation(
    expr: &Expr,
    raw: bool,
    ev: &Evaluator<'_>,
    ctx: &Context<'_>,
    out: &mut String,
) {
    match ev.evaluate(expr, ctx) {
        Value::Null => {}
        Value::Array(_) => out.push_str(&InlineError::ArrayInterpolation.to_string()),
        Value::Object(_) => out.push_str(&InlineError::ObjectInterpolation.to_string()),
        value => {
            let text = value.to_output_string();
            if raw {
                out.push_str(&text);
            } else {
                escape_html_into(&text, out);
            }
        }
    }
}

/// The first truthy branch wins; conditions after it are not evaluated.
fn render_if(
    branches: &[Branch],
    fallback: Option<&[Node]>,
    ev: &Evaluator<'_>,
    ctx: &Context<'_>,
    out: &mut String,
) {
    let chosen = branches
        .iter()
        .find(|branch| ev.evaluate(&branch.condition, ctx).is_truthy())
        .map(|branch| branch.body.as_slice())
        .or(fallback);
    if let Some(body) = chosen {
        render_nodes(body, ev, ctx, out);
    }
}

#[allow(clippy::too_many_arguments)]
fn render_each(
    source: &Expr,
    item: &str,
    index: Option<&str>,
    body: &[Node],
    fallback: Option<&[Node]>,
    ev: &Evaluator<'_>,
    ctx: &Context<'_>,
    out: &mut String,
) {
    let items = match ev.evaluate(source, ctx) {
        Value::Array(items) => items,
        // The fallback is only for empty sequences.
        _ => {
            out.push_str(&InlineError::EachNeedsArray.to_string());
            return;
        }
    };

    if items.is_empty() {
        if let Some(fallback) = fallback {
            render_nodes(fallback, ev, ctx, out);
        }
        return;
    }

    for (i, element) in items.iter().enumerate() {
        let child = ctx.child(item, element, index.map(|name| (name, i)));
        render_nodes(body, ev, &child, out);
    }
}

// ── Escaping ────────────────────────────────────────────────────────

/// HTML-escape `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_html_into(s, &mut out);
    out
}

fn escape_html_into(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}
