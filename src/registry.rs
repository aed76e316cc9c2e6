use crate::ast::Expr;
use crate::builtins;
use crate::error::RegistryError;
use crate::eval::Evaluator;
use crate::value::{Context, Value};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::debug;

/// Engine-provided function: sees the unevaluated arguments and the scope,
/// so it can decide what to evaluate.
pub type BuiltinFn = fn(&Evaluator<'_>, &[&Expr], &Context<'_>) -> Value;

/// Host-provided function: sees only evaluated arguments.
pub type CustomFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

#[derive(Clone)]
pub enum Function {
    Builtin { min_args: usize, call: BuiltinFn },
    Custom(CustomFn),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin { min_args, .. } => f
                .debug_struct("Builtin")
                .field("min_args", min_args)
                .finish_non_exhaustive(),
            Function::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

static FUNCTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("function name pattern is valid"));

/// Name → function table consulted when a call or pipe is evaluated.
#[derive(Debug, Clone)]
pub struct Registry {
    functions: HashMap<String, Function>,
}

impl Registry {
    /// A registry holding every built-in.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for &(name, min_args, call) in builtins::CATALOGUE {
            registry
                .functions
                .insert(name.to_string(), Function::Builtin { min_args, call });
        }
        registry
    }

    /// A registry with no functions at all.
    pub fn empty() -> Self {
        Registry {
            functions: HashMap::new(),
        }
    }

    /// Insert or replace a host function.
    ///
    /// The function receives its arguments already evaluated, left to right.
    /// Names must be made of ASCII letters, digits and `_`, since nothing
    /// else can be written in a template.
    pub fn register<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        if !FUNCTION_NAME.is_match(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let replaced = self
            .functions
            .insert(name.to_string(), Function::Custom(Arc::new(f)))
            .is_some();
        debug!(function = name, replaced, "registered function");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Process-wide registry ───────────────────────────────────────────

// Renders take an `Arc` snapshot; registration swaps in a modified copy, so
// a render in progress never observes a half-applied registration.
static GLOBAL: LazyLock<RwLock<Arc<Registry>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Registry::new())));

/// Insert or replace a host function in the process-wide registry used by
/// [`crate::render`] and [`crate::Template::render`].
pub fn register_function<F>(name: &str, f: F) -> Result<(), RegistryError>
where
    F: Fn(&[Value]) -> Value + Send + Sync + 'static,
{
    let mut guard = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    Arc::make_mut(&mut *guard).register(name, f)
}

/// Snapshot of the process-wide registry.
pub fn global_registry() -> Arc<Registry> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
