use crate::ast::*;
use crate::json::map_from_json_value;
use crate::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Shared fixture runners ──────────────────────────────────────────

/// Embed fixture files at compile time.
const RENDER_FIXTURES: &str = include_str!("../test-data/fixtures/render.json");
const PARSE_FIXTURES: &str = include_str!("../test-data/fixtures/parse.json");

fn data(json: serde_json::Value) -> Map {
    map_from_json_value(json).unwrap()
}

#[test]
fn test_fixture_render() {
    let fixtures: Vec<serde_json::Value> = serde_json::from_str(RENDER_FIXTURES).unwrap();
    assert!(!fixtures.is_empty());

    for fixture in &fixtures {
        let name = fixture["name"].as_str().unwrap();
        let template = fixture["template"].as_str().unwrap();
        let expected = fixture["expected"].as_str().unwrap();
        let data = data(fixture["data"].clone());

        let got = compile(template).render_with(&Registry::new(), &data);
        assert_eq!(
            got, expected,
            "Fixture '{}': output mismatch for template {:?}",
            name, template
        );
    }
}

/// Fixture form of a parsed tree.
fn nodes_to_json(nodes: &[Node]) -> serde_json::Value {
    serde_json::Value::Array(nodes.iter().map(node_to_json).collect())
}

fn node_to_json(node: &Node) -> serde_json::Value {
    match node {
        Node::Text(text) => json!({ "text": text }),
        Node::Interpolation { expr, raw: false } => json!({ "out": expr_to_json(expr) }),
        Node::Interpolation { expr, raw: true } => json!({ "raw": expr_to_json(expr) }),
        Node::If { branches, fallback } => {
            let branches: Vec<serde_json::Value> = branches
                .iter()
                .map(|branch| {
                    json!({
                        "cond": expr_to_json(&branch.condition),
                        "body": nodes_to_json(&branch.body),
                    })
                })
                .collect();
            json!({ "if": branches, "else": fallback.as_deref().map(nodes_to_json) })
        }
        Node::Each {
            source,
            item,
            index,
            body,
            fallback,
        } => json!({
            "each": expr_to_json(source),
            "as": item,
            "index": index,
            "body": nodes_to_json(body),
            "else": fallback.as_deref().map(nodes_to_json),
        }),
    }
}

fn expr_to_json(expr: &Expr) -> serde_json::Value {
    let args_to_json =
        |args: &[Expr]| serde_json::Value::Array(args.iter().map(expr_to_json).collect());
    match expr {
        Expr::Literal(value) => json!({ "lit": value.to_json() }),
        Expr::Variable(path) => json!({ "var": path }),
        Expr::Call { name, args } => json!({ "call": name, "args": args_to_json(args) }),
        Expr::Pipe { input, name, args } => json!({
            "pipe": name,
            "input": expr_to_json(input),
            "args": args_to_json(args),
        }),
    }
}

#[test]
fn test_fixture_parse() {
    let fixtures: Vec<serde_json::Value> = serde_json::from_str(PARSE_FIXTURES).unwrap();
    assert!(!fixtures.is_empty());

    for fixture in &fixtures {
        let name = fixture["name"].as_str().unwrap();
        let template = fixture["template"].as_str().unwrap();
        let expected = &fixture["expected"];

        let got = nodes_to_json(&parse(template));
        assert_eq!(
            &got, expected,
            "Fixture '{}': tree mismatch\n  Got:      {}\n  Expected: {}",
            name, got, expected
        );
    }
}

/// A registry with a `bump()` function that counts how often it runs.
fn counting_registry() -> (Registry, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new();
    let counter = Arc::clone(&calls);
    registry
        .register("bump", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::Bool(true)
        })
        .unwrap();
    (registry, calls)
}

fn render_in(registry: &Registry, template: &str, data: &Map) -> String {
    compile(template).render_with(registry, data)
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn test_scenarios() {
    assert_eq!(render("{{ a.b }}", &data(json!({"a": {"b": "x"}}))), "x");
    assert_eq!(
        render("{{ tags }}", &data(json!({"tags": [1, 2]}))),
        "[Error: use #each for arrays]"
    );
    assert_eq!(
        render(
            "{{#if eq(n,1)}}A{{:else if eq(n,2)}}B{{:else}}C{{/if}}",
            &data(json!({"n": 2}))
        ),
        "B"
    );
    assert_eq!(
        render(
            "{{#each xs as x, i}}{{i}}:{{x}} {{/each}}",
            &data(json!({"xs": ["a", "b"]}))
        ),
        "0:a 1:b "
    );
    assert_eq!(
        render(
            "{{ s | truncate(5, \"…\") }}",
            &data(json!({"s": "Hello World"}))
        ),
        "Hello…"
    );
    assert_eq!(render("\\{{ x }}", &Map::new()), "{{ x }}");
}

// ── Parser ──────────────────────────────────────────────────────────

#[test]
fn test_parse_pipe_chain() {
    let nodes = parse("{{ a.b | truncate(3) | upper }}");
    let expected = vec![Node::Interpolation {
        expr: Expr::Pipe {
            input: Box::new(Expr::Pipe {
                input: Box::new(Expr::Variable(vec!["a".into(), "b".into()])),
                name: "truncate".into(),
                args: vec![Expr::Literal(Value::Number(3.0))],
            }),
            name: "upper".into(),
            args: vec![],
        },
        raw: false,
    }];
    assert_eq!(nodes, expected);
}

#[test]
fn test_parse_raw_and_text() {
    let nodes = parse("a{{+ x +}}b");
    assert_eq!(
        nodes,
        vec![
            Node::Text("a".into()),
            Node::Interpolation {
                expr: Expr::Variable(vec!["x".into()]),
                raw: true,
            },
            Node::Text("b".into()),
        ]
    );
}

#[test]
fn test_parse_each_block() {
    let nodes = parse("{{#each items as item, n}}{{item}}{{:else}}none{{/each}}");
    assert_eq!(
        nodes,
        vec![Node::Each {
            source: Expr::Variable(vec!["items".into()]),
            item: "item".into(),
            index: Some("n".into()),
            body: vec![Node::Interpolation {
                expr: Expr::Variable(vec!["item".into()]),
                raw: false,
            }],
            fallback: Some(vec![Node::Text("none".into())]),
        }]
    );
}

#[test]
fn test_parse_if_branches() {
    let nodes = parse("{{#if a}}1{{:elseif b}}2{{:else if c}}3{{:else}}4{{/if}}");
    let Node::If { branches, fallback } = &nodes[0] else {
        panic!("expected an if node, got {:?}", nodes);
    };
    assert_eq!(nodes.len(), 1);
    assert_eq!(branches.len(), 3);
    assert_eq!(branches[2].condition, Expr::Variable(vec!["c".into()]));
    assert_eq!(branches[2].body, vec![Node::Text("3".into())]);
    assert_eq!(fallback.as_deref(), Some(&[Node::Text("4".into())][..]));
}

#[test]
fn test_parse_call_literals() {
    let nodes = parse("{{ f('a', -2, .5, true, null, x.0) }}");
    let Node::Interpolation {
        expr: Expr::Call { name, args },
        ..
    } = &nodes[0]
    else {
        panic!("expected a call, got {:?}", nodes);
    };
    assert_eq!(name, "f");
    assert_eq!(
        args,
        &vec![
            Expr::Literal(Value::from("a")),
            Expr::Literal(Value::Number(-2.0)),
            Expr::Literal(Value::Number(0.5)),
            Expr::Literal(Value::Bool(true)),
            Expr::Literal(Value::Null),
            Expr::Variable(vec!["x".into(), "0".into()]),
        ]
    );
}

#[test]
fn test_parse_digitless_number_is_variable() {
    assert_eq!(
        parse("{{ -. }}"),
        vec![Node::Interpolation {
            expr: Expr::Variable(vec!["-.".into()]),
            raw: false,
        }]
    );
}

#[test]
fn test_parse_terminates_on_malformed_input() {
    let inputs = [
        "{{",
        "{{#",
        "{{#each",
        "{{#each xs as",
        "{{#if",
        "{{#if x}}{{:else",
        "{{ (((",
        "{{ a(b(c(",
        "}}}}",
        "{{+",
        "{{ 'x",
        "{{ \"x\\",
        "\\",
        "\\{",
        "{{:else",
        "{{ a | | | }}",
        "{{ @#$%^&* }}",
        "{{ ,,,) }}",
        "{{ é }}",
    ];
    for input in inputs {
        let tree = compile(input);
        // Rendering must also finish.
        let _ = tree.render_with(&Registry::new(), &Map::new());
    }
}

#[test]
fn test_block_depth_limit() {
    let options = Options::new().with_max_depth(2);
    let template = compile_with(
        "{{#if t}}{{#if t}}{{#if t}}x{{/if}}{{/if}}{{/if}}",
        &options,
    );
    let out = template.render_with(&Registry::new(), &data(json!({"t": true})));
    assert_eq!(out, "[Error: nesting too deep] t}}x");
}

#[test]
fn test_expression_depth_limit() {
    let options = Options::new().with_max_depth(3);
    let template = compile_with("{{ not(not(not(not(x)))) }}after", &options);
    let out = template.render_with(&Registry::new(), &Map::new());
    // The innermost call is cut off; the tag still closes normally.
    assert!(out.ends_with("after"), "got {:?}", out);
    assert_eq!(
        compile_with("{{ not(not(x)) }}", &options).render_with(&Registry::new(), &Map::new()),
        "false"
    );
}

#[test]
fn test_pipe_chain_depth_limit() {
    let data = data(json!({"x": " a "}));
    let long = format!("{{{{ x{} }}}}after", " | trim".repeat(5_000));
    assert_eq!(render(&long, &data), "[Error: nesting too deep]after");
    let short = format!("{{{{ x{} }}}}", " | trim".repeat(10));
    assert_eq!(render(&short, &data), "a");

    // Pipes and call arguments share one depth budget.
    let options = Options::new().with_max_depth(3);
    let template = compile_with("{{ x | trim | trim | trim }}", &options);
    assert_eq!(
        template.render_with(&Registry::new(), &data),
        "[Error: nesting too deep]"
    );
    let template = compile_with("{{ x | trim | trim }}", &options);
    assert_eq!(template.render_with(&Registry::new(), &data), "a");
}

#[test]
fn test_deep_nesting_does_not_overflow() {
    let template = "{{#if t}}".repeat(10_000) + "x";
    let out = render(&template, &data(json!({"t": true})));
    assert!(out.contains("[Error: nesting too deep]"));
}

#[test]
fn test_template_size_limit() {
    let options = Options::new().with_max_template_len(4);
    let template = compile_with("hello", &options);
    assert_eq!(template.render(&Map::new()), "[Error: template too large]");
    assert_eq!(compile_with("abcd", &options).render(&Map::new()), "abcd");
}

// ── Values ──────────────────────────────────────────────────────────

#[test]
fn test_truthiness() {
    let falsy = [
        Value::Null,
        Value::Bool(false),
        Value::Number(0.0),
        Value::Number(f64::NAN),
        Value::from(""),
        Value::Array(vec![]),
        Value::Object(Map::new()),
    ];
    for value in &falsy {
        assert!(!value.is_truthy(), "{:?} should be falsy", value);
    }

    let truthy = [
        Value::Bool(true),
        Value::Number(-1.0),
        Value::from("0"),
        Value::from(vec![Value::Bool(false)]),
        Value::Object(data(json!({"a": false}))),
    ];
    for value in &truthy {
        assert!(value.is_truthy(), "{:?} should be truthy", value);
    }
}

#[test]
fn test_output_string_numbers() {
    assert_eq!(Value::Number(1.0).to_output_string(), "1");
    assert_eq!(Value::Number(-0.0).to_output_string(), "0");
    assert_eq!(Value::Number(0.1 + 0.2).to_output_string(), "0.30000000000000004");
    assert_eq!(Value::Number(f64::NAN).to_output_string(), "NaN");
    assert_eq!(Value::Number(f64::NEG_INFINITY).to_output_string(), "-Infinity");
    assert_eq!(Value::Number(1e21).to_output_string(), "1e+21");
    assert_eq!(Value::Number(-1.23e22).to_output_string(), "-1.23e+22");
    assert_eq!(Value::Number(1e20).to_output_string(), "100000000000000000000");
    assert_eq!(Value::Number(1e-7).to_output_string(), "1e-7");
    assert_eq!(Value::Number(1.5e-7).to_output_string(), "1.5e-7");
    assert_eq!(Value::Number(0.000001).to_output_string(), "0.000001");
    assert_eq!(
        Value::from(vec![Value::from(1), Value::Null, Value::from("x")]).to_output_string(),
        "1,,x"
    );
    assert_eq!(
        Value::Object(Map::new()).to_output_string(),
        "[object Object]"
    );
}

#[test]
fn test_to_number() {
    assert_eq!(Value::from(" 42 ").to_number(), 42.0);
    assert_eq!(Value::from("").to_number(), 0.0);
    assert_eq!(Value::from(true).to_number(), 1.0);
    assert_eq!(Value::Null.to_number(), 0.0);
    assert_eq!(Value::from(vec!["7"]).to_number(), 7.0);
    assert_eq!(Value::from(Vec::<Value>::new()).to_number(), 0.0);
    assert!(Value::from("abc").to_number().is_nan());
    assert!(Value::from("inf").to_number().is_nan());
    assert!(Value::from(vec![1, 2]).to_number().is_nan());
    assert_eq!(Value::from("-Infinity").to_number(), f64::NEG_INFINITY);
}

#[test]
fn test_escape_html() {
    assert_eq!(
        escape_html("<a href=\"x\">Tom & 'Jerry'</a>"),
        "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
    );
    // Already-escaped text is escaped again, once.
    assert_eq!(escape_html("&amp;"), "&amp;amp;");
}

// ── Evaluation ──────────────────────────────────────────────────────

#[test]
fn test_and_short_circuits() {
    let (registry, calls) = counting_registry();
    let out = render_in(&registry, "[{{ and(f, bump()) }}]", &data(json!({"f": 0})));
    assert_eq!(out, "[0]");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    render_in(&registry, "{{ and(t, bump()) }}", &data(json!({"t": 1})));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_or_short_circuits() {
    let (registry, calls) = counting_registry();
    let out = render_in(&registry, "{{ or(t, bump()) }}", &data(json!({"t": "yes"})));
    assert_eq!(out, "yes");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_if_stops_at_first_truthy_branch() {
    let (registry, calls) = counting_registry();
    let out = render_in(
        &registry,
        "{{#if t}}A{{:else if bump()}}B{{/if}}",
        &data(json!({"t": true})),
    );
    assert_eq!(out, "A");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_arity_error_skips_argument_evaluation() {
    let (registry, calls) = counting_registry();
    let out = render_in(&registry, "{{ replace(bump(), bump()) }}", &Map::new());
    assert_eq!(out, "[Error: replace() needs 3 args]");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_custom_function_gets_evaluated_args() {
    let mut registry = Registry::new();
    registry
        .register("concat", |args| {
            Value::String(args.iter().map(Value::to_output_string).collect())
        })
        .unwrap();
    let out = render_in(
        &registry,
        "{{ concat(a, \"-\", and(1, 2)) }}|{{ a | concat(\"!\") }}",
        &data(json!({"a": "x"})),
    );
    assert_eq!(out, "x-2|x!");
}

#[test]
fn test_custom_function_overrides_builtin() {
    let mut registry = Registry::new();
    registry
        .register("uppercase", |_| Value::from("overridden"))
        .unwrap();
    // Custom functions have no minimum argument count.
    assert_eq!(render_in(&registry, "{{ uppercase() }}", &Map::new()), "overridden");
}

#[test]
fn test_empty_registry() {
    let out = render_in(&Registry::empty(), "{{ eq(1, 1) }}", &Map::new());
    assert_eq!(out, "[Error: unknown eq()]");
}

#[test]
fn test_register_rejects_bad_names() {
    let mut registry = Registry::new();
    let err = registry.register("my-fn", |_| Value::Null).unwrap_err();
    assert_eq!(err, RegistryError::InvalidName("my-fn".into()));
    assert!(registry.register("", |_| Value::Null).is_err());
    assert!(!registry.contains("my-fn"));
}

#[test]
fn test_registry_names() {
    let registry = Registry::new();
    let names = registry.names();
    for builtin in ["and", "default", "eq", "join", "limit", "truncate"] {
        assert!(names.contains(&builtin), "missing built-in {}", builtin);
    }
    assert_eq!(names.len(), 20);
}

#[test]
fn test_global_registration() {
    register_function("curlew_test_shout", |args| {
        Value::String(format!("{}!", args[0].to_output_string().to_uppercase()))
    })
    .unwrap();
    assert!(global_registry().contains("curlew_test_shout"));
    assert_eq!(
        render("{{ name | curlew_test_shout }}", &data(json!({"name": "hey"}))),
        "HEY!"
    );
    assert!(register_function("not valid", |_| Value::Null).is_err());
}

// ── Rendering ───────────────────────────────────────────────────────

#[test]
fn test_render_is_repeatable() {
    let template = compile("{{#each xs as x, i}}{{i}}={{x | uppercase}};{{/each}}{{ x }}");
    let input = data(json!({"xs": ["a", "b"], "x": "outer"}));
    let first = template.render(&input);
    let second = template.render(&input);
    assert_eq!(first, "0=A;1=B;outer");
    assert_eq!(first, second);
}

#[test]
fn test_concurrent_renders_do_not_interfere() {
    let template = compile("{{#each xs as x}}[{{ x }}:{{ tag }}]{{/each}}");
    let registry = Registry::new();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let template = &template;
                let registry = &registry;
                scope.spawn(move || {
                    let input = data(json!({"xs": [n, n + 1], "tag": format!("t{}", n)}));
                    (n, template.render_with(registry, &input))
                })
            })
            .collect();

        for handle in handles {
            let (n, out) = handle.join().unwrap();
            assert_eq!(out, format!("[{}:t{}][{}:t{}]", n, n, n + 1, n));
        }
    });
}

#[test]
fn test_loop_scope_is_discarded() {
    let root = data(json!({"xs": [{"v": 1}, {"v": 2}]}));
    let ctx = Context::new(&root);
    let item = Value::from("inner");
    {
        let child = ctx.child("xs", &item, Some(("i", 3)));
        assert_eq!(child.lookup("xs"), Some(&Value::from("inner")));
        assert_eq!(child.lookup("i"), Some(&Value::Number(3.0)));
    }
    assert!(matches!(ctx.lookup("xs"), Some(Value::Array(_))));
    assert_eq!(ctx.lookup("i"), None);
}

// ── JSON data ───────────────────────────────────────────────────────

#[test]
fn test_map_from_json() {
    let map = map_from_json(r#"{"n": 3, "tags": ["a"], "meta": {"ok": true}}"#).unwrap();
    assert_eq!(map["n"], Value::Number(3.0));
    assert_eq!(map["tags"], Value::from(vec!["a"]));
    assert_eq!(
        map["meta"].to_json(),
        json!({"ok": true}),
    );

    assert!(matches!(
        map_from_json("[1, 2]"),
        Err(DataError::NotAnObject("an array"))
    ));
    assert!(matches!(map_from_json("{"), Err(DataError::Json(_))));
}

#[test]
fn test_non_finite_numbers_to_json() {
    assert_eq!(Value::Number(f64::NAN).to_json(), serde_json::Value::Null);
}

// ── Validation ──────────────────────────────────────────────────────

#[test]
fn test_validate_clean_template() {
    let template = compile("{{#each xs as x, i}}{{ x | truncate(3) }}{{/each}}");
    assert!(template.validate(&Registry::new()).is_empty());
}

#[test]
fn test_validate_reports_problems() {
    let template = compile(
        "{{ nope(1) }}{{#if a}}{{ a | replace(\"x\") }}{{/if}}{{#each xs as }}{{/each}}{{#loop}}",
    );
    let errors = template.validate(&Registry::new());
    let codes: Vec<&str> = errors.iter().map(|e| e.code).collect();
    assert_eq!(
        codes,
        vec!["unknown-function", "too-few-args", "empty-binding", "inline-error"]
    );
    assert_eq!(errors[0].path, vec!["[0]"]);
    assert_eq!(errors[1].path, vec!["[1]", "if[0]", "[0]"]);
}

#[test]
fn test_validate_ignores_error_like_text() {
    let template = compile("[Error: see docs]{{ x }}[Error: nesting too deep!]");
    assert!(template.validate(&Registry::new()).is_empty());

    let errors = compile("{{#each xs}}{{/each}}").validate(&Registry::new());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "inline-error");
}

#[test]
fn test_validate_nested_args() {
    let template = compile("{{ default(missing_fn(x), \"y\") }}");
    let errors = template.validate(&Registry::new());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "unknown-function");
    assert!(errors[0].message.contains("missing_fn"));
}
