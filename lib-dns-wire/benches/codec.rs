use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::net::Ipv4Addr;

use dns_wire::protocol::types::*;

#[allow(non_snake_case)]
fn bench__question(c: &mut Criterion) {
    let message = Message::from_question(
        1234,
        Question {
            name: domain("www.example.com."),
            qtype: RecordType::A,
            qclass: RecordClass::IN,
        },
    );

    c.bench_function("serialise/question", |b| {
        b.iter_batched(
            || message.clone(),
            |message| message.into_octets(),
            BatchSize::SmallInput,
        )
    });

    let serialised = message.into_octets().unwrap();
    c.bench_function("deserialise/question", |b| {
        b.iter(|| Message::from_octets(black_box(&serialised)))
    });
}

#[allow(non_snake_case)]
fn bench__referral(c: &mut Criterion) {
    let mut message = Message::from_question(
        1234,
        Question {
            name: domain("www.example.com."),
            qtype: RecordType::A,
            qclass: RecordClass::IN,
        },
    )
    .make_response();

    let count = 13u8;

    for i in 0..count {
        message.authority.push(ns_record(
            "example.com.",
            &format!("ns-{i:?}.example.net."),
        ));
    }
    for i in 0..count {
        message.additional.push(a_record(
            &format!("ns-{i:?}.example.net."),
            Ipv4Addr::new(192, 0, 2, i),
        ));
    }

    c.bench_function("serialise/referral", |b| {
        b.iter_batched(
            || message.clone(),
            |message| message.into_octets(),
            BatchSize::SmallInput,
        )
    });

    let serialised = message.into_octets().unwrap();
    c.bench_function("deserialise/referral", |b| {
        b.iter(|| Message::from_octets(black_box(&serialised)))
    });
}

fn domain(name: &str) -> DomainName {
    DomainName::from_dotted_string(name).unwrap()
}

fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
    ResourceRecord {
        name: domain(name),
        rtype_with_data: RecordTypeWithData::A { address },
        rclass: RecordClass::IN,
        ttl: 300,
    }
}

fn ns_record(superdomain_name: &str, nameserver_name: &str) -> ResourceRecord {
    ResourceRecord {
        name: domain(superdomain_name),
        rtype_with_data: RecordTypeWithData::NS {
            nsdname: domain(nameserver_name),
        },
        rclass: RecordClass::IN,
        ttl: 300,
    }
}

criterion_group!(benches, bench__question, bench__referral);
criterion_main!(benches);
