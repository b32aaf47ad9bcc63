use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::net::Ipv4Addr;

use dns_walker::cache::Cache;
use dns_wire::protocol::types::*;

#[allow(non_snake_case)]
fn bench__insert__unique(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert/unique");
    for size in [1, 100, 1000] {
        let rrs = make_rrs(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rrs, |b, rrs| {
            b.iter(|| build_cache(rrs));
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__insert__duplicate(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert/duplicate");
    for size in [1, 100, 1000] {
        let rr = ResourceRecord {
            name: DomainName::from_dotted_string("www.example.com.").unwrap(),
            rtype_with_data: RecordTypeWithData::A {
                address: Ipv4Addr::new(192, 0, 2, 1),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };
        let rrs = vec![rr; size];

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rrs, |b, rrs| {
            b.iter(|| build_cache(rrs));
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__get__hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get/hit");
    for size in [1, 100, 1000] {
        let rrs = make_rrs(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rrs, |b, rrs| {
            b.iter_batched(
                || build_cache(rrs),
                |cache| {
                    for rr in rrs {
                        cache.get(&rr.name, rr.rtype_with_data.rtype());
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

#[allow(non_snake_case)]
fn bench__nearest_ns(c: &mut Criterion) {
    let mut cache = Cache::new();
    cache.insert(&ResourceRecord {
        name: DomainName::from_dotted_string("example.com.").unwrap(),
        rtype_with_data: RecordTypeWithData::NS {
            nsdname: DomainName::from_dotted_string("ns1.example.net.").unwrap(),
        },
        rclass: RecordClass::IN,
        ttl: 300,
    });
    let name = DomainName::from_dotted_string("deep.subdomain.of.www.example.com.").unwrap();

    c.bench_function("nearest_ns", |b| b.iter(|| cache.nearest_ns(&name)));
}

fn make_rrs(size: usize) -> Vec<ResourceRecord> {
    let mut out = Vec::with_capacity(size);
    for i in 0..size {
        out.push(ResourceRecord {
            name: DomainName::from_dotted_string(&format!("host-{i}.example.com.")).unwrap(),
            rtype_with_data: RecordTypeWithData::A {
                address: Ipv4Addr::new(192, 0, 2, (i % 256) as u8),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        });
    }
    out
}

fn build_cache(rrs: &[ResourceRecord]) -> Cache {
    let mut cache = Cache::new();
    for rr in rrs {
        cache.insert(rr);
    }
    cache
}

criterion_group!(
    benches,
    bench__insert__unique,
    bench__insert__duplicate,
    bench__get__hit,
    bench__nearest_ns,
);
criterion_main!(benches);
