//! Syntax tree produced by the parser and walked by the renderer.
//! A tree is immutable once built and can be rendered from many threads.

use crate::value::Value;

/// An expression inside a tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"text"`, `'text'`, `42`, `-1.5`, `true`, `false`, `null`
    Literal(Value),
    /// `name` or `a.b.0`: segments are resolved left to right
    Variable(Vec<String>),
    /// `name(arg, ...)`: arguments stay unevaluated until the call runs
    Call { name: String, args: Vec<Expr> },
    /// `input | name(arg, ...)`: same as `name(input, arg, ...)`
    Pipe {
        input: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

/// One `{{#if}}` / `{{:else if}}` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Expr,
    pub body: Vec<Node>,
}

/// A tree element.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, emitted verbatim.
    Text(String),
    /// `{{ expr }}` (escaped) or `{{+ expr +}}` (raw).
    Interpolation { expr: Expr, raw: bool },
    /// `{{#if c}}...{{:else if c}}...{{:else}}...{{/if}}`
    If {
        branches: Vec<Branch>,
        fallback: Option<Vec<Node>>,
    },
    /// `{{#each source as item, index}}...{{:else}}...{{/each}}`
    Each {
        source: Expr,
        item: String,
        index: Option<String>,
        body: Vec<Node>,
        fallback: Option<Vec<Node>>,
    },
}
