use crate::ast::{Branch, Expr, Node};
use crate::error::InlineError;
use crate::options::Options;
use crate::value::Value;
use tracing::trace;

const IF_STOPS: &[&str] = &["{{:else", "{{/if}}"];
const IF_FALLBACK_STOPS: &[&str] = &["{{/if}}"];
const EACH_STOPS: &[&str] = &["{{:else", "{{/each}}"];
const EACH_FALLBACK_STOPS: &[&str] = &["{{/each}}"];

/// Parser state: tracks position in the input string.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Open blocks around the cursor.
    block_depth: usize,
    /// Open expressions around the cursor (call arguments, pipes).
    expr_depth: usize,
    options: &'a Options,
}

/// Parse a template with default limits.
pub fn parse(input: &str) -> Vec<Node> {
    parse_with(input, &Options::default())
}

/// Parse a template into a tree.
///
/// Never fails: malformed tags turn into inline error text or close at the
/// end of the input.
pub fn parse_with(input: &str, options: &Options) -> Vec<Node> {
    if let Some(max) = options.max_template_len {
        if input.len() > max {
            trace!(len = input.len(), max, "template exceeds size limit");
            return vec![Node::Text(InlineError::TemplateTooLarge.to_string())];
        }
    }

    let mut parser = Parser {
        input,
        pos: 0,
        block_depth: 0,
        expr_depth: 0,
        options,
    };
    parser.parse_nodes(&[])
}

impl<'a> Parser<'a> {
    // ── Helpers ──────────────────────────────────────────────────────

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn starts_with(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    fn eat_char(&mut self, ch: char) -> bool {
        if self.peek_char() == Some(ch) {
            self.advance(ch.len_utf8());
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.advance(s.len());
            true
        } else {
            false
        }
    }

    /// Eat `word` only when it is not the prefix of a longer identifier.
    fn eat_keyword(&mut self, word: &str) -> bool {
        if !self.starts_with(word) {
            return false;
        }
        let next = self.remaining()[word.len()..].chars().next();
        if next.is_some_and(is_word_char) {
            return false;
        }
        self.advance(word.len());
        true
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance(ch.len_utf8());
            } else {
                break;
            }
        }
    }

    /// Consume through the next `}}`, or to the end of input if there is none.
    fn close_tag(&mut self) {
        match self.remaining().find("}}") {
            Some(idx) => self.advance(idx + 2),
            None => self.pos = self.input.len(),
        }
    }

    /// Move up to (not past) the next `}}`, or to the end of input.
    fn skip_to_tag_end(&mut self) {
        match self.remaining().find("}}") {
            Some(idx) => self.advance(idx),
            None => self.pos = self.input.len(),
        }
    }

    fn read_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if is_word_char(ch) {
                self.advance(ch.len_utf8());
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    // ── Nodes ───────────────────────────────────────────────────────

    /// Parse nodes until end of input or until the cursor sits on one of
    /// `stops`. The stop sequence itself is left for the caller.
    fn parse_nodes(&mut self, stops: &[&str]) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while let Some(ch) = self.peek_char() {
            if stops.iter().any(|stop| self.starts_with(stop)) {
                break;
            }
            if self.eat_str("\\{{") {
                text.push_str("{{");
                continue;
            }
            if self.starts_with("{{") {
                if !text.is_empty() {
                    nodes.push(Node::Text(std::mem::take(&mut text)));
                }
                self.parse_tag(&mut nodes);
                continue;
            }
            text.push(ch);
            self.advance(ch.len_utf8());
        }

        if !text.is_empty() {
            nodes.push(Node::Text(text));
        }
        nodes
    }

    fn parse_tag(&mut self, nodes: &mut Vec<Node>) {
        self.advance(2);
        match self.peek_char() {
            Some('#') => {
                self.advance(1);
                self.parse_block(nodes);
            }
            Some('+') => {
                self.advance(1);
                let expr = self.parse_tag_expr();
                self.skip_ws();
                // The closing `+` is optional.
                self.eat_char('+');
                self.close_tag();
                nodes.push(Node::Interpolation { expr, raw: true });
            }
            _ => {
                let expr = self.parse_tag_expr();
                self.close_tag();
                nodes.push(Node::Interpolation { expr, raw: false });
            }
        }
    }

    /// The expression at the head of a tag. An empty tag yields `null`
    /// without touching the closing delimiter.
    fn parse_tag_expr(&mut self) -> Expr {
        self.skip_ws();
        if self.at_end() || self.starts_with("}}") || self.starts_with("+}}") {
            return Expr::Literal(Value::Null);
        }
        self.parse_expression()
    }

    // ── Blocks ──────────────────────────────────────────────────────

    fn parse_block(&mut self, nodes: &mut Vec<Node>) {
        let keyword = self.read_identifier();
        match keyword {
            "if" | "each" if self.block_depth >= self.options.max_depth => {
                trace!(keyword, depth = self.block_depth, "block nesting limit reached");
                nodes.push(Node::Text(InlineError::TooDeep.to_string()));
            }
            "if" => {
                self.block_depth += 1;
                let node = self.parse_if();
                self.block_depth -= 1;
                nodes.push(node);
            }
            "each" => {
                self.block_depth += 1;
                let node = self.parse_each();
                self.block_depth -= 1;
                nodes.push(node);
            }
            other => {
                // Parsing resumes right after the keyword.
                trace!(keyword = other, "unknown block keyword");
                nodes.push(Node::Text(
                    InlineError::UnknownBlock(other.to_string()).to_string(),
                ));
            }
        }
    }

    /// `{{#if c}}...{{:else if c}}...{{:elseif c}}...{{:else}}...{{/if}}`
    fn parse_if(&mut self) -> Node {
        let mut branches = Vec::new();
        let mut fallback = None;

        let mut condition = self.parse_tag_expr();
        self.close_tag();

        loop {
            let body = self.parse_nodes(IF_STOPS);
            branches.push(Branch { condition, body });

            if self.eat_str("{{/if}}") || self.at_end() {
                break;
            }
            // The cursor is on `{{:else`.
            match self.parse_else_if() {
                Some(next) => condition = next,
                None => {
                    self.close_tag();
                    let body = self.parse_nodes(IF_FALLBACK_STOPS);
                    self.eat_str("{{/if}}");
                    fallback = Some(body);
                    break;
                }
            }
        }

        Node::If { branches, fallback }
    }

    /// Consume an `{{:else if c}}` / `{{:elseif c}}` tag and return its
    /// condition. For a plain `{{:else` the cursor is left inside the tag
    /// and `None` is returned.
    fn parse_else_if(&mut self) -> Option<Expr> {
        if self.eat_str("{{:elseif") {
            let condition = self.parse_tag_expr();
            self.close_tag();
            return Some(condition);
        }

        self.advance("{{:else".len());
        let before_ws = self.pos;
        self.skip_ws();
        if self.pos > before_ws && self.eat_keyword("if") {
            let condition = self.parse_tag_expr();
            self.close_tag();
            return Some(condition);
        }
        None
    }

    /// `{{#each source as item[, index]}}...{{:else}}...{{/each}}`
    ///
    /// Without `as` the opening tag becomes an inline error and whatever
    /// follows it is parsed as ordinary content.
    fn parse_each(&mut self) -> Node {
        let source = self.parse_tag_expr();
        self.skip_ws();
        if !self.eat_keyword("as") {
            trace!("#each without 'as'");
            self.close_tag();
            return Node::Text(InlineError::EachMissingAs.to_string());
        }

        self.skip_ws();
        let item = self.read_identifier().to_string();
        self.skip_ws();
        let index = if self.eat_char(',') {
            self.skip_ws();
            Some(self.read_identifier().to_string())
        } else {
            None
        };
        self.close_tag();

        let body = self.parse_nodes(EACH_STOPS);
        let fallback = if self.starts_with("{{:else") {
            self.close_tag();
            Some(self.parse_nodes(EACH_FALLBACK_STOPS))
        } else {
            None
        };
        self.eat_str("{{/each}}");

        Node::Each {
            source,
            item,
            index,
            body,
            fallback,
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    /// A base expression followed by any number of `| name(args)` pipes.
    fn parse_expression(&mut self) -> Expr {
        if self.expr_depth >= self.options.max_depth {
            trace!(depth = self.expr_depth, "expression nesting limit reached");
            self.skip_to_tag_end();
            return Expr::Literal(InlineError::TooDeep.into());
        }
        self.expr_depth += 1;

        let mut expr = self.parse_primary();
        // Every pipe wraps the expression one level deeper.
        let mut pipes = 0;
        loop {
            self.skip_ws();
            if !self.eat_char('|') {
                break;
            }
            if self.expr_depth >= self.options.max_depth {
                trace!(depth = self.expr_depth, "pipe chain nesting limit reached");
                self.skip_to_tag_end();
                expr = Expr::Literal(InlineError::TooDeep.into());
                break;
            }
            self.expr_depth += 1;
            pipes += 1;
            self.skip_ws();
            let name = self.read_identifier().to_string();
            let args = if self.eat_char('(') {
                self.parse_args()
            } else {
                Vec::new()
            };
            expr = Expr::Pipe {
                input: Box::new(expr),
                name,
                args,
            };
        }

        self.expr_depth -= 1 + pipes;
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        self.skip_ws();
        let start = self.pos;

        let expr = match self.peek_char() {
            Some(quote @ ('"' | '\'')) => Expr::Literal(Value::String(self.parse_string(quote))),
            Some(ch) if ch == '-' || ch == '.' || ch.is_ascii_digit() => self.parse_number(),
            _ => self.parse_name(),
        };

        // Unrecognized input: step over one character so the scan always
        // makes progress.
        if self.pos == start {
            if let Some(ch) = self.peek_char() {
                self.advance(ch.len_utf8());
            }
        }
        expr
    }

    /// Keyword literal, call, or variable path.
    fn parse_name(&mut self) -> Expr {
        let name = self.read_identifier();
        match name {
            "" | "null" => return Expr::Literal(Value::Null),
            "true" => return Expr::Literal(Value::Bool(true)),
            "false" => return Expr::Literal(Value::Bool(false)),
            _ => {}
        }

        if self.eat_char('(') {
            return Expr::Call {
                name: name.to_string(),
                args: self.parse_args(),
            };
        }

        let mut path = vec![name.to_string()];
        while self.eat_char('.') {
            path.push(self.read_identifier().to_string());
        }
        Expr::Variable(path)
    }

    /// Arguments after an opening `(`. Stops at `)`, and also at `}` or the
    /// end of input so an unclosed call cannot swallow the template.
    fn parse_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            match self.peek_char() {
                None | Some('}') => break,
                Some(')') => {
                    self.advance(1);
                    break;
                }
                Some(',') => self.advance(1),
                Some(_) => args.push(self.parse_expression()),
            }
        }
        args
    }

    // ── Literals ────────────────────────────────────────────────────

    /// Optional `-`, then digits with at most one `.`. A run without any
    /// digit (`-`, `.`, `-.`) becomes a one-segment variable named by the
    /// run itself.
    fn parse_number(&mut self) -> Expr {
        let start = self.pos;
        self.eat_char('-');

        let mut seen_dot = false;
        let mut has_digit = false;
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                has_digit = true;
            } else if ch == '.' && !seen_dot {
                seen_dot = true;
            } else {
                break;
            }
            self.advance(1);
        }

        let text = &self.input[start..self.pos];
        if !has_digit {
            return Expr::Variable(vec![text.to_string()]);
        }
        Expr::Literal(Value::Number(text.parse().unwrap_or(f64::NAN)))
    }

    /// Quoted string with `\n`, `\t`, `\r`, `\\` and `\<quote>` escapes.
    /// An unterminated literal is the empty string and only its opening
    /// quote is consumed.
    fn parse_string(&mut self, quote: char) -> String {
        self.advance(quote.len_utf8());
        let body_start = self.pos;
        let mut result = String::new();

        while let Some(ch) = self.peek_char() {
            self.advance(ch.len_utf8());
            if ch == quote {
                return result;
            }
            if ch != '\\' {
                result.push(ch);
                continue;
            }
            match self.peek_char() {
                None => break,
                Some(esc) => {
                    self.advance(esc.len_utf8());
                    match esc {
                        'n' => result.push('\n'),
                        't' => result.push('\t'),
                        'r' => result.push('\r'),
                        '\\' => result.push('\\'),
                        c if c == quote => result.push(c),
                        c => {
                            result.push('\\');
                            result.push(c);
                        }
                    }
                }
            }
        }

        self.pos = body_start;
        String::new()
    }
}

/// Identifier characters: ASCII letters, digits and `_`.
fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}
