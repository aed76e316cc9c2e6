use crate::ast::Expr;
use crate::error::InlineError;
use crate::registry::{Function, Registry};
use crate::value::{Context, Value};
use tracing::debug;

/// Evaluates expressions against a scope. Holds nothing but the registry,
/// so one evaluator can serve any number of renders.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'r> {
    registry: &'r Registry,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Evaluator { registry }
    }

    /// Evaluate `expr`. Failures come back as error text values, never as
    /// a Rust error.
    pub fn evaluate(&self, expr: &Expr, ctx: &Context<'_>) -> Value {
        match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Variable(path) => resolve_path(path, ctx).cloned().unwrap_or_default(),
            Expr::Call { name, args } => {
                let args: Vec<&Expr> = args.iter().collect();
                self.call(name, &args, ctx)
            }
            Expr::Pipe { input, name, args } => {
                let args: Vec<&Expr> = std::iter::once(input.as_ref()).chain(args).collect();
                self.call(name, &args, ctx)
            }
        }
    }

    fn call(&self, name: &str, args: &[&Expr], ctx: &Context<'_>) -> Value {
        match self.registry.get(name) {
            None => {
                debug!(function = name, "call to unknown function");
                InlineError::UnknownFunction(name.to_string()).into()
            }
            Some(Function::Builtin { min_args, call }) => {
                // Checked before any argument is evaluated.
                if args.len() < *min_args {
                    return InlineError::TooFewArgs {
                        name: name.to_string(),
                        needed: *min_args,
                    }
                    .into();
                }
                call(self, args, ctx)
            }
            Some(Function::Custom(f)) => {
                let values: Vec<Value> = args.iter().map(|arg| self.evaluate(arg, ctx)).collect();
                f(&values)
            }
        }
    }
}

/// Walk `path` from the scope. Any missing key, or a step into a value
/// without keys, makes the whole path absent.
pub fn resolve_path<'c>(path: &[String], ctx: &'c Context<'_>) -> Option<&'c Value> {
    let (first, rest) = path.split_first()?;
    let mut current = ctx.lookup(first)?;
    for segment in rest {
        current = current.get_owned(segment)?;
    }
    Some(current)
}
