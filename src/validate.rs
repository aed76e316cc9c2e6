use crate::ast::*;
use crate::error::InlineError;
use crate::registry::{Function, Registry};

/// A problem found in a template without rendering it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub message: String,
    /// Where in the tree the problem sits (e.g. `["[2]", "if[0]", "[1]"]`).
    pub path: Vec<String>,
    /// Machine-readable error code.
    pub code: &'static str,
}

/// Check a parsed template against the functions in `registry`.
///
/// Returns an empty vec when nothing would render an inline error for
/// reasons visible before data is known.
pub fn validate_template(nodes: &[Node], registry: &Registry) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut path = Vec::new();
    walk_nodes(nodes, registry, &mut path, &mut errors);
    errors
}

fn walk_nodes(
    nodes: &[Node],
    registry: &Registry,
    path: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) {
    for (i, node) in nodes.iter().enumerate() {
        path.push(format!("[{}]", i));
        walk_node(node, registry, path, errors);
        path.pop();
    }
}

fn walk_node(
    node: &Node,
    registry: &Registry,
    path: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) {
    match node {
        Node::Text(text) => {
            if is_inline_error(text) {
                errors.push(ValidationError {
                    message: format!("Malformed tag: {}", text),
                    path: path.clone(),
                    code: "inline-error",
                });
            }
        }
        Node::Interpolation { expr, .. } => walk_expr(expr, registry, path, errors),
        Node::If { branches, fallback } => {
            for (i, branch) in branches.iter().enumerate() {
                path.push(format!("if[{}]", i));
                walk_expr(&branch.condition, registry, path, errors);
                walk_nodes(&branch.body, registry, path, errors);
                path.pop();
            }
            if let Some(fallback) = fallback {
                path.push("else".to_string());
                walk_nodes(fallback, registry, path, errors);
                path.pop();
            }
        }
        Node::Each {
            source,
            item,
            index,
            body,
            fallback,
        } => {
            walk_expr(source, registry, path, errors);
            if item.is_empty() || index.as_deref() == Some("") {
                errors.push(ValidationError {
                    message: "#each binding name is empty".to_string(),
                    path: path.clone(),
                    code: "empty-binding",
                });
            }
            path.push("each".to_string());
            walk_nodes(body, registry, path, errors);
            path.pop();
            if let Some(fallback) = fallback {
                path.push("else".to_string());
                walk_nodes(fallback, registry, path, errors);
                path.pop();
            }
        }
    }
}

fn walk_expr(
    expr: &Expr,
    registry: &Registry,
    path: &mut Vec<String>,
    errors: &mut Vec<ValidationError>,
) {
    let (name, supplied, args) = match expr {
        Expr::Literal(_) | Expr::Variable(_) => return,
        Expr::Call { name, args } => (name, args.len(), args),
        Expr::Pipe { input, name, args } => {
            walk_expr(input, registry, path, errors);
            (name, args.len() + 1, args)
        }
    };

    match registry.get(name) {
        None => errors.push(ValidationError {
            message: format!("Unknown function {}()", name),
            path: path.clone(),
            code: "unknown-function",
        }),
        Some(Function::Builtin { min_args, .. }) if supplied < *min_args => {
            errors.push(ValidationError {
                message: format!(
                    "{}() needs {} args but {} supplied",
                    name, min_args, supplied
                ),
                path: path.clone(),
                code: "too-few-args",
            })
        }
        Some(_) => {}
    }

    for arg in args {
        walk_expr(arg, registry, path, errors);
    }
}

/// Text nodes the parser produces in place of a malformed tag. Only the
/// exact recovery texts match; ordinary text that happens to look like an
/// error does not.
fn is_inline_error(text: &str) -> bool {
    let fixed = [
        InlineError::EachMissingAs,
        InlineError::TooDeep,
        InlineError::TemplateTooLarge,
    ];
    if fixed.iter().any(|err| text == err.to_string()) {
        return true;
    }
    text.strip_prefix("[Error: unknown block #")
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|keyword| {
            keyword
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        })
}
