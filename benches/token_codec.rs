//! Benchmarks for token minting
//!
//! This benchmark measures:
//! - UTF-16 base64 encode/decode speed
//! - Challenge evaluation in the sandbox
//! - Model table evaluation from a bundle chunk

use ai_playground_rust::catalog::BundlePatternMatcher;
use ai_playground_rust::codec::{from_binary, to_binary};
use ai_playground_rust::sandbox::{Bindings, ExpressionEvaluator, Sandbox, SandboxLimits};
use ai_playground_rust::token::{challenge_bindings, seal, Challenge};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

const CHALLENGE_CODE: &str = r#"function(a){var b=[];for(var i=0;i<16;i++){b.push((a*i)%7)}var s="v".fontcolor();return [b.reduce(function(x,y){return x+y},0),s.length,globalThis.marker]}"#;

const MODEL_TABLE: &str = r#"{"openai:gpt-3.5-turbo":{id:"openai:gpt-3.5-turbo",provider:"openai",parameters:{temperature:{value:.7,range:[0,2]},maximumLength:{value:256,range:[50,1024]},topP:{value:1,range:[0,1]},stopSequences:{value:[],range:[]}},enabled:!0},"anthropic:claude-v1":{id:"anthropic:claude-v1",provider:"anthropic",parameters:{temperature:{value:1},maximumLength:{value:200},stopSequences:{value:["\n\nHuman:"]}},enabled:!1}}"#;

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in [64usize, 1024, 16 * 1024] {
        let text: String = "challenge-ü-".chars().cycle().take(size).collect();
        let encoded = to_binary(&text);
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_with_input(BenchmarkId::new("to_binary", size), &text, |b, text| {
            b.iter(|| to_binary(black_box(text)))
        });
        group.bench_with_input(BenchmarkId::new("from_binary", size), &encoded, |b, encoded| {
            b.iter(|| from_binary(black_box(encoded)).unwrap())
        });
    }

    group.finish();
}

fn bench_challenge(c: &mut Criterion) {
    let mut group = c.benchmark_group("challenge");
    let sandbox = Sandbox::new(SandboxLimits::default());
    let body = to_binary(&json!({ "c": CHALLENGE_CODE, "a": 13, "t": "1681000000" }).to_string());

    group.bench_function("decode", |b| {
        b.iter(|| Challenge::decode(black_box(&body)).unwrap())
    });

    let challenge = Challenge::decode(&body).unwrap();
    let invocation = challenge.invocation();
    let bindings = challenge_bindings();
    group.bench_function("evaluate", |b| {
        b.iter(|| sandbox.evaluate(black_box(&invocation), &bindings).unwrap())
    });

    group.bench_function("mint_offline", |b| {
        b.iter(|| {
            let challenge = Challenge::decode(black_box(&body)).unwrap();
            let result = sandbox
                .evaluate(&challenge.invocation(), &challenge_bindings())
                .unwrap();
            seal(result, &challenge.timestamp).unwrap()
        })
    });

    group.finish();
}

fn bench_model_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_table");
    let sandbox = Sandbox::new(SandboxLimits::default());
    let chunk = format!(
        r#"(self.webpackChunk_N_E=self.webpackChunk_N_E||[]).push([[1],{{1:function(e,t,n){{let r="\n\nHuman:",o={},i=Object.keys(o);}}}}]);"#,
        MODEL_TABLE
    );
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    group.bench_function("extract_expression", |b| {
        b.iter(|| BundlePatternMatcher::extract_model_expression(black_box(&chunk)).unwrap())
    });

    let expression = BundlePatternMatcher::extract_model_expression(&chunk).unwrap();
    let source = expression.resolved();
    group.bench_function("evaluate_table", |b| {
        b.iter(|| sandbox.evaluate(black_box(&source), &Bindings::new()).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_challenge, bench_model_table);
criterion_main!(benches);
