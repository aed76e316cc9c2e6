use std::collections::BTreeMap;

/// A key → value mapping. Membership is the only way a key resolves;
/// there are no inherited or synthesized members.
pub type Map = BTreeMap<String, Value>;

/// Data handed to a template, and the result of every expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Both JSON `null` and "not present".
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    /// Engine truthiness: `null`, `false`, `0`, `NaN`, `""`, `[]` and `{}`
    /// are falsy. Everything else is truthy, including `[false]` and
    /// `{"a": false}`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }

    /// Step one path segment into this value.
    ///
    /// Objects resolve keys they actually contain. Arrays resolve canonical
    /// decimal indices (`0`, `12`; not `01` or `+1`) that are in bounds.
    /// Nothing else has keys.
    pub fn get_owned(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                if idx.to_string() != segment {
                    return None;
                }
                items.get(idx)
            }
            _ => None,
        }
    }

    /// String form used for output and by the string built-ins.
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_output_string)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Numeric coercion used by the comparison built-ins and counts.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [only] => parse_number(&only.to_output_string()),
                _ => f64::NAN,
            },
            Value::Object(_) => f64::NAN,
        }
    }
}

/// Shortest round-trip form; integral values print without a fraction.
/// Magnitudes of `1e21` and up, or below `1e-6`, use exponent notation with
/// an explicit sign (`1e+21`, `1.5e-7`).
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        // Covers -0 as well.
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let exp = format!("{:e}", n);
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                format!("{}e+{}", mantissa, power)
            }
            _ => exp,
        }
    } else {
        n.to_string()
    }
}

fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Keep `str::parse` from accepting spellings like `inf` or `nan`.
    if !s
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

// ── Conversions ─────────────────────────────────────────────────────

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

// ── Render scope ────────────────────────────────────────────────────

/// Names visible to variable resolution at one point of a render.
///
/// The root frame borrows the caller's data. Each loop iteration pushes a
/// child frame that holds only its bindings and points at the enclosing
/// scope, so bindings shadow outer names for one iteration and never touch
/// the enclosing scope.
#[derive(Debug)]
pub struct Context<'a> {
    parent: Option<&'a Context<'a>>,
    frame: Frame<'a>,
}

#[derive(Debug)]
enum Frame<'a> {
    Root(&'a Map),
    Loop {
        item_name: &'a str,
        item: &'a Value,
        index: Option<(&'a str, Value)>,
    },
}

impl<'a> Context<'a> {
    pub fn new(data: &'a Map) -> Self {
        Context {
            parent: None,
            frame: Frame::Root(data),
        }
    }

    /// Scope for one loop iteration.
    pub fn child(
        &'a self,
        item_name: &'a str,
        item: &'a Value,
        index: Option<(&'a str, usize)>,
    ) -> Context<'a> {
        Context {
            parent: Some(self),
            frame: Frame::Loop {
                item_name,
                item,
                index: index.map(|(name, i)| (name, Value::from(i))),
            },
        }
    }

    /// Resolve a top-level name, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            match &ctx.frame {
                Frame::Root(map) => return map.get(name),
                Frame::Loop {
                    item_name,
                    item,
                    index,
                } => {
                    // The index binding is applied after the item binding,
                    // so it wins when both use the same name.
                    if let Some((index_name, value)) = index {
                        if *index_name == name {
                            return Some(value);
                        }
                    }
                    if *item_name == name {
                        return Some(*item);
                    }
                }
            }
            scope = ctx.parent;
        }
        None
    }
}
