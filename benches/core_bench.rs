//! Benchmarks for azcompose core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use azcompose::constructs::{
    build_stack, Network, NetworkProps, ResourceGroup, ResourceGroupProps, SubnetProps,
};
use azcompose::core::context::StackContext;
use azcompose::core::parser::parse_stack;
use azcompose::core::stack::Stack;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const STACK_YAML: &str = r#"
version: "1.0"
name: bench
resource_groups:
  - id: core
    name: rg-bench
    rbac: { alice: Reader, bob: Contributor, carol: Owner }
networks:
  - id: hub
    resource_group: core
  - id: spoke
    resource_group: core
    address_space: ["10.1.0.0/16"]
    subnets:
      - { name: app, address_prefixes: ["10.1.1.0/24"] }
      - { name: db, address_prefixes: ["10.1.2.0/24"] }
    peer_with: [hub]
storage_accounts:
  - id: data
    resource_group: core
    name: stbench
    containers:
      - name: assets
        blobs: [{ name: a.txt }, { name: b.txt }]
virtual_machines:
  - id: jump
    resource_group: core
    network: spoke
    subnet: app
    ssh_public_key: ssh-ed25519 AAAA
"#;

/// Stack with one network holding `subnets` subnets.
fn wide_network(subnets: usize) -> Stack {
    let mut stack = Stack::new("bench", StackContext::placeholder()).unwrap();
    let root = stack.root();
    let rg = ResourceGroup::new(&mut stack, root, "core", &ResourceGroupProps::new("rg", "eastus"))
        .unwrap();
    let rg = rg.reference(&stack.tree);
    let props = NetworkProps {
        address_space: vec!["10.0.0.0/8".into()],
        subnets: (0..subnets)
            .map(|i| SubnetProps::new(format!("subnet{i}"), format!("10.{}.{}.0/24", i / 256, i % 256)))
            .collect(),
        ..NetworkProps::default()
    };
    Network::new(&mut stack, root, "hub", &rg, &props).unwrap();
    stack
}

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");
    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(wide_network(size)));
        });
    }
    group.finish();
}

fn bench_synthesize(c: &mut Criterion) {
    let mut group = c.benchmark_group("synthesize");
    for size in [10, 100, 1000] {
        let stack = wide_network(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &stack, |b, stack| {
            b.iter(|| black_box(stack.synthesize().unwrap()));
        });
    }
    group.finish();
}

fn bench_stack_file(c: &mut Criterion) {
    c.bench_function("stack_file_parse", |b| {
        b.iter(|| black_box(parse_stack(black_box(STACK_YAML)).unwrap()));
    });

    let file = parse_stack(STACK_YAML).unwrap();
    c.bench_function("stack_file_build_and_synth", |b| {
        b.iter(|| {
            let stack = build_stack(&file, StackContext::placeholder()).unwrap();
            black_box(stack.synthesize().unwrap().to_engine_json().unwrap())
        });
    });
}

fn bench_engine_json(c: &mut Criterion) {
    let doc = wide_network(100).synthesize().unwrap();
    c.bench_function("engine_json_100", |b| {
        b.iter(|| black_box(doc.to_engine_json().unwrap()));
    });
    c.bench_function("fingerprint_100", |b| {
        b.iter(|| black_box(doc.fingerprint().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_tree_build,
    bench_synthesize,
    bench_stack_file,
    bench_engine_json
);
criterion_main!(benches);
