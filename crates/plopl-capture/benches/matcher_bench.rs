use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plopl_capture::matcher::matches;
use plopl_capture::path::{extract, PathExpr};
use plopl_capture::schema::Schema;
use plopl_capture::validation::validate;
use serde_json::{json, Value};

const QUERY: &str = "query Viewer { viewer { login followers { totalCount } repositories(first: 10) { nodes { name stargazerCount } } } }";

fn gql_schema() -> Schema {
    Schema::new("bench", "api.github.com/graphql", "POST")
        .with_body_query(QUERY)
        .with_rules(&[
            ("data.viewer.login", "x.startsWith('octo')"),
            ("data.viewer.followers.totalCount", "x >= 10"),
            ("data.viewer.repositories.nodes[].length()", "x > 0"),
            ("data.viewer.repositories.nodes[].find(name)", "x === 'repo-5'"),
        ])
}

fn response_body(repos: usize) -> Value {
    let nodes: Vec<Value> = (0..repos)
        .map(|i| json!({"name": format!("repo-{i}"), "stargazerCount": i * 3}))
        .collect();
    json!({
        "data": {
            "viewer": {
                "login": "octocat",
                "followers": {"totalCount": 42},
                "repositories": {"nodes": nodes}
            }
        }
    })
}

fn bench_request_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_matching");
    let schema = gql_schema();
    let url = "https://api.github.com/graphql";

    let matching = json!({"query": QUERY, "variables": {}});
    let reformatted = json!({"query": QUERY.replace(' ', "\n  ")});
    let other = json!({"query": "query Other { rateLimit { remaining } }"});

    group.throughput(Throughput::Elements(1));
    group.bench_function("url_and_method_only", |b| {
        b.iter(|| matches(black_box(url), black_box("POST"), None, black_box(&schema)));
    });
    group.bench_function("body_exact", |b| {
        b.iter(|| matches(black_box(url), "POST", Some(black_box(&matching)), &schema));
    });
    group.bench_function("body_whitespace_normalized", |b| {
        b.iter(|| matches(black_box(url), "POST", Some(black_box(&reformatted)), &schema));
    });
    group.bench_function("body_mismatch", |b| {
        b.iter(|| matches(black_box(url), "POST", Some(black_box(&other)), &schema));
    });

    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_extraction");
    let paths = [
        "data.viewer.login",
        "data.viewer.repositories.nodes[].length()",
        "data.viewer.repositories.nodes[].find(stargazerCount)",
    ];

    for repos in [10, 100, 1000].iter() {
        let body = response_body(*repos);
        for raw in paths {
            let path = PathExpr::parse(raw);
            group.bench_with_input(BenchmarkId::new(raw, repos), repos, |b, _| {
                b.iter(|| extract(black_box(&body), black_box(&path)));
            });
        }
    }

    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    let schema = gql_schema();

    for repos in [10, 100, 1000].iter() {
        let body = response_body(*repos);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("validate", repos), repos, |b, _| {
            b.iter(|| validate(black_box(&schema), black_box(&body)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_request_matching, bench_extraction, bench_validation);
criterion_main!(benches);
