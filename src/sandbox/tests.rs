use super::*;
use serde_json::json;

fn eval(source: &str) -> Result<Json, SandboxError> {
    Sandbox::default().evaluate(source, &Bindings::new())
}

fn marker_bindings() -> Bindings {
    Bindings::new().with("globalThis", json!({ "marker": "mark" }))
}

#[test]
fn evaluates_plain_expressions() {
    assert_eq!(eval("1 + 2 * 3").unwrap(), json!(7));
    assert_eq!(eval("'a' + 1 + 2").unwrap(), json!("a12"));
    assert_eq!(eval("0.1 + 0.2").unwrap(), json!(0.30000000000000004));
    assert_eq!(eval("[1, 'two', null, true]").unwrap(), json!([1, "two", null, true]));
    assert_eq!(eval("({ a: 1, 'b': [2] })").unwrap(), json!({ "a": 1, "b": [2] }));
}

#[test]
fn applies_a_challenge_shaped_function() {
    let source = r#"(function(a){return [a * 2, "x".fontcolor().length, globalThis.marker]})(21)"#;
    let out = Sandbox::default()
        .evaluate(source, &marker_bindings())
        .unwrap();
    assert_eq!(out, json!([42, 14, "mark"]));
}

#[test]
fn runs_loops_and_closures() {
    let source = "(function(n){ let s = 0; for (let i = 0; i < n; i++) { s += i } return s })(10)";
    assert_eq!(eval(source).unwrap(), json!(45));

    let source = "(() => { const add = x => y => x + y; return [1, 2, 3].map(add(10)) })()";
    assert_eq!(eval(source).unwrap(), json!([11, 12, 13]));
}

#[test]
fn hoists_var_and_function_declarations() {
    let source = "(function(){ var out = twice(v); function twice(x){ return x * 2 } var v = 4; return [out, twice(v)] })()";
    assert_eq!(eval(source).unwrap(), json!([null, 8]));
}

#[test]
fn string_and_array_builtins() {
    assert_eq!(
        eval("'a,b,c'.split(',').map(s => s.toUpperCase()).reverse().join('-')").unwrap(),
        json!("C-B-A")
    );
    assert_eq!(
        eval("String.fromCharCode(72, 105) + 'i'.charCodeAt(0)").unwrap(),
        json!("Hi105")
    );
    assert_eq!(eval("[3, 1, 10, 2].sort()").unwrap(), json!([1, 10, 2, 3]));
    assert_eq!(
        eval("[3, 1, 10, 2].sort((a, b) => a - b)").unwrap(),
        json!([1, 2, 3, 10])
    );
    assert_eq!(eval("[1, 2, 3, 4].reduce((a, b) => a + b)").unwrap(), json!(10));
    assert_eq!(eval("'abc'.padStart(5, '-').slice(-4)").unwrap(), json!("-abc"));
    assert_eq!(eval("(255).toString(16) + (2.5).toFixed(0)").unwrap(), json!("ff3"));
    assert_eq!(eval("Math.max(1, 5, 3) + Math.floor(-1.5)").unwrap(), json!(3));
    assert_eq!(eval("JSON.stringify({ a: [1, 'x'] })").unwrap(), json!("{\"a\":[1,\"x\"]}"));
    assert_eq!(eval("Object.keys({ z: 1, a: 2 })").unwrap(), json!(["z", "a"]));
}

#[test]
fn coercions_match_javascript() {
    assert_eq!(eval("[] + {}").unwrap(), json!("[object Object]"));
    assert_eq!(eval("'5' * '2'").unwrap(), json!(10));
    assert_eq!(eval("null == undefined && null !== undefined").unwrap(), json!(true));
    assert_eq!(eval("typeof notDeclared").unwrap(), json!("undefined"));
    assert_eq!(eval("-1 >>> 0").unwrap(), json!(4294967295u64));
    assert_eq!(eval("1 / 0").unwrap(), json!(null));
}

#[test]
fn optional_chains_short_circuit() {
    assert_eq!(eval("({ a: null })?.a?.b.c").unwrap(), json!(null));
    assert_eq!(eval("({ a: { b: 2 } }).a?.b").unwrap(), json!(2));
}

#[test]
fn catches_runtime_errors_inside_the_script() {
    let source = "(() => { try { null.x } catch (e) { return e.name } })()";
    assert_eq!(eval(source).unwrap(), json!("TypeError"));

    let source = "(() => { let log = []; try { throw new Error('boom') } catch (e) { log.push(e.message) } finally { log.push('done') } return log })()";
    assert_eq!(eval(source).unwrap(), json!(["boom", "done"]));
}

#[test]
fn reports_uncaught_exceptions() {
    let err = eval("(() => { throw new Error('boom') })()").unwrap_err();
    assert_eq!(err, SandboxError::Thrown("Error: boom".into()));
}

#[test]
fn host_capabilities_are_absent() {
    for source in ["require('fs')", "process.exit(1)", "fetch('http://example.com')"] {
        assert!(
            matches!(eval(source), Err(SandboxError::Reference(_))),
            "{} should not resolve",
            source
        );
    }
}

#[test]
fn runaway_loops_hit_the_step_budget() {
    let sandbox = Sandbox::new(SandboxLimits {
        max_steps: 10_000,
        ..SandboxLimits::default()
    });
    let err = sandbox
        .evaluate("(function(){ while (true) {} })()", &Bindings::new())
        .unwrap_err();
    assert!(matches!(err, SandboxError::LimitExceeded(_)));
}

#[test]
fn unbounded_recursion_hits_the_call_depth_limit() {
    let err = eval("(function f(n){ return f(n + 1) })(0)").unwrap_err();
    assert!(matches!(err, SandboxError::LimitExceeded(_)));
}

/// Evaluate on a thread with the blocking pool's default 2 MiB stack.
fn eval_on_small_stack(source: String) -> Result<Json, SandboxError> {
    std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || eval(&source))
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn long_operator_chains_hit_the_nesting_limit() {
    let err = eval_on_small_stack(format!("1{}", "+1".repeat(10_000))).unwrap_err();
    assert!(matches!(err, SandboxError::LimitExceeded(_)));

    let err = eval_on_small_stack(format!("'a'{}", ".toString()".repeat(10_000))).unwrap_err();
    assert!(matches!(err, SandboxError::LimitExceeded(_)));

    let err = eval_on_small_stack(format!("x{}", "[0]".repeat(10_000))).unwrap_err();
    assert!(matches!(err, SandboxError::LimitExceeded(_)));
}

#[test]
fn moderate_chains_still_evaluate() {
    assert_eq!(
        eval_on_small_stack(format!("1{}", "+1".repeat(50))).unwrap(),
        json!(51)
    );
    assert_eq!(
        eval_on_small_stack(format!("'a'{}", ".toString()".repeat(20))).unwrap(),
        json!("a")
    );
}

#[test]
fn huge_strings_are_refused() {
    let err = eval("'x'.repeat(1e9)").unwrap_err();
    assert!(matches!(err, SandboxError::LimitExceeded(_)));
}

#[test]
fn evaluations_do_not_share_globals() {
    let sandbox = Sandbox::default();
    assert_eq!(
        sandbox.evaluate("(leaked = 1, leaked)", &Bindings::new()).unwrap(),
        json!(1)
    );
    assert_eq!(
        sandbox.evaluate("typeof leaked", &Bindings::new()).unwrap(),
        json!("undefined")
    );
}

#[test]
fn bindings_are_visible_as_globals() {
    let bindings = Bindings::new().with("input", json!({ "n": [1, 2] }));
    assert_eq!(
        Sandbox::default()
            .evaluate("input.n.length + input.n[1]", &bindings)
            .unwrap(),
        json!(4)
    );
}

#[test]
fn const_bindings_are_immutable() {
    let err = eval("(() => { const a = 1; a = 2; return a })()").unwrap_err();
    assert!(matches!(err, SandboxError::Type(_)));
}
