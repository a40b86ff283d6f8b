use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hyper::HeaderMap;
use mimic_proxy::matcher::{find_match, rule_matches};
use mimic_proxy::model::{BodyMatch, RequestContext, Rule};
use std::collections::BTreeMap;

fn create_test_rule(id: usize, wildcard: bool) -> Rule {
    let path = if wildcard {
        format!("/api/v1/endpoint{id}/*")
    } else {
        format!("/api/v1/endpoint{id}")
    };
    let mut rule = Rule::mock("GET", &path, "[200]\nbody:\nok");
    rule.condition.method.push("POST".to_string());
    rule
}

fn create_rules(count: usize, wildcard: bool) -> Vec<Rule> {
    (0..count).map(|i| create_test_rule(i, wildcard)).collect()
}

fn context(path: &str) -> RequestContext {
    RequestContext::new("GET", path, None, &HeaderMap::new(), b"")
}

fn bench_rule_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_matching");

    for rule_count in [10, 50, 100, 500, 1000].iter() {
        let rules = create_rules(*rule_count, false);

        let ctx_first = context("/api/v1/endpoint0");
        let ctx_middle = context(&format!("/api/v1/endpoint{}", rule_count / 2));
        let ctx_last = context(&format!("/api/v1/endpoint{}", rule_count - 1));
        let ctx_none = context("/not/found");

        group.throughput(Throughput::Elements(1));
        for (name, ctx) in [
            ("match_first", &ctx_first),
            ("match_middle", &ctx_middle),
            ("match_last", &ctx_last),
            ("match_none", &ctx_none),
        ] {
            group.bench_with_input(BenchmarkId::new(name, rule_count), rule_count, |b, _| {
                b.iter(|| find_match(black_box(&rules), black_box(ctx)));
            });
        }
    }

    group.finish();
}

fn bench_wildcard_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("wildcard_matching");

    for rule_count in [10, 50, 100].iter() {
        let rules = create_rules(*rule_count, true);
        let ctx = context("/api/v1/endpoint9/item");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("wildcard_match", rule_count),
            rule_count,
            |b, _| {
                b.iter(|| find_match(black_box(&rules), black_box(&ctx)));
            },
        );
    }

    group.finish();
}

fn bench_predicate_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_rule_eval");

    let mut rule = create_test_rule(0, false);
    rule.condition.query = BTreeMap::from([("page".to_string(), r"^\d+$".to_string())]);
    rule.condition.body = Some(BodyMatch {
        matches: r#""kind":\s*"order""#.to_string(),
    });

    let mut headers = HeaderMap::new();
    headers.insert("content-type", "application/json".parse().unwrap());
    let ctx = RequestContext::new(
        "GET",
        "/api/v1/endpoint0",
        Some("page=3"),
        &headers,
        br#"{"kind": "order", "id": 7}"#,
    );

    group.throughput(Throughput::Elements(1));
    group.bench_function("all_predicates", |b| {
        b.iter(|| rule_matches(black_box(&rule), black_box(&ctx)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_rule_matching,
    bench_wildcard_matching,
    bench_predicate_evaluation
);
criterion_main!(benches);
