/// Parser limits for templates that come from untrusted sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Deepest allowed nesting of blocks, and separately of expressions.
    pub max_depth: usize,
    /// Longest template (in bytes) that will be parsed. `None` = no limit.
    pub max_template_len: Option<usize>,
}

pub const DEFAULT_MAX_DEPTH: usize = 64;

impl Options {
    pub fn new() -> Self {
        Options {
            max_depth: DEFAULT_MAX_DEPTH,
            max_template_len: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_template_len(mut self, max_len: usize) -> Self {
        self.max_template_len = Some(max_len);
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
