//! curlew: a small `{{ }}` template engine for rendering HTML fragments from
//! structured data.
//!
//! Templates cannot run code. Expressions are limited to literals, variable
//! paths, calls to registered functions and pipes, and blocks are limited to
//! `{{#if}}` and `{{#each}}`. Nothing in a template can fail a render:
//! problems show up as `[Error: ...]` text in the output.
//!
//! ```
//! use curlew::{render, Map, Value};
//!
//! let mut data = Map::new();
//! data.insert("name".to_string(), Value::from("<World>"));
//! assert_eq!(render("Hello {{ name }}!", &data), "Hello &lt;World&gt;!");
//! ```

pub mod ast;
mod builtins;
pub mod error;
pub mod eval;
pub mod interpreter;
pub mod json;
pub mod options;
pub mod parser;
pub mod registry;
pub mod validate;
pub mod value;

use ast::Node;

pub use error::{DataError, InlineError, RegistryError};
pub use interpreter::escape_html;
pub use json::map_from_json;
pub use options::Options;
pub use parser::{parse, parse_with};
pub use registry::{global_registry, register_function, Registry};
pub use validate::{validate_template, ValidationError};
pub use value::{Context, Map, Value};

// ── Core API ───────────────────────────────────────────────────────

/// A parsed template, ready to be rendered any number of times.
///
/// The tree is immutable, so one `Template` can be shared across threads and
/// rendered concurrently against different data.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Render with a snapshot of the process-wide registry.
    pub fn render(&self, data: &Map) -> String {
        self.render_with(&global_registry(), data)
    }

    /// Render resolving functions in `registry` only.
    pub fn render_with(&self, registry: &Registry, data: &Map) -> String {
        interpreter::render(&self.nodes, registry, data)
    }

    /// Problems detectable without data, checked against `registry`.
    pub fn validate(&self, registry: &Registry) -> Vec<ValidationError> {
        validate_template(&self.nodes, registry)
    }
}

/// Parse `template` once for repeated rendering.
pub fn compile(template: &str) -> Template {
    compile_with(template, &Options::default())
}

pub fn compile_with(template: &str, options: &Options) -> Template {
    Template {
        nodes: parse_with(template, options),
    }
}

/// Parse and render in one step.
pub fn render(template: &str, data: &Map) -> String {
    compile(template).render(data)
}

#[cfg(test)]
mod tests;
