use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use dns_walker::cache::SharedCache;
use dns_walker::hints::load_root_hints;
use dns_walker::iterative::Resolver;
use dns_walker::util::types::ResolutionError;
use dns_wire::protocol::types::{Message, RecordType, ResourceRecord};

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// Interactive iterative DNS lookup tool
///
/// Walks the DNS hierarchy itself, starting from the root servers in
/// the hints file, instead of delegating to a recursive resolver.  It
/// only queries upstream nameservers over IPv4: the AAAA root records
/// are loaded but unused.
struct Args {
    /// Path to the root hints file
    #[clap(short = 'r', long, default_value = "named.root", value_parser)]
    hints: PathBuf,

    /// Port to send upstream queries to
    #[clap(long, default_value_t = dns_walker::iterative::DNS_PORT, value_parser)]
    port: u16,

    /// Per-server receive timeout, in milliseconds
    #[clap(long, default_value_t = 1000, value_parser)]
    timeout_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let cache = SharedCache::new();
    let roots = match load_root_hints(&args.hints, &cache).await {
        Ok(roots) => roots,
        Err(error) => {
            eprintln!(
                "could not load root hints from '{}': {error}",
                args.hints.display()
            );
            process::exit(1);
        }
    };

    let resolver = Resolver::new(roots, cache)
        .with_upstream_port(args.port)
        .with_timeout(Duration::from_millis(args.timeout_ms));

    loop {
        println!();
        println!("1) forward lookup (A)");
        println!("2) reverse lookup (IPv4)");
        println!("3) reverse lookup (IPv6)");
        println!("4) custom query");
        println!("5) exit");

        let Some(choice) = prompt("> ") else { break };
        match choice.as_str() {
            "1" => {
                let Some(name) = prompt("domain name: ") else { break };
                let result = resolver.recursive_query(&name, RecordType::A).await;
                print_result(&result);
            }
            "2" => {
                let Some(address) = prompt("IPv4 address: ") else { break };
                let result = resolver.reverse_lookup_v4(&address).await;
                print_result(&result);
            }
            "3" => {
                let Some(address) = prompt("IPv6 address: ") else { break };
                let result = resolver.reverse_lookup_v6(&address).await;
                print_result(&result);
            }
            "4" => {
                let Some(name) = prompt("domain name: ") else { break };
                let Some(qtype_str) = prompt("record type: ") else { break };
                match qtype_str.parse::<RecordType>() {
                    Ok(qtype) => {
                        let result = resolver.recursive_query(&name, qtype).await;
                        print_result(&result);
                    }
                    Err(error) => println!("; {error}"),
                }
            }
            "5" | "q" | "quit" | "exit" => break,
            "" => (),
            _ => println!("; unrecognised option"),
        }
    }
}

/// Print a prompt and read one trimmed line.  `None` means stdin was
/// closed.
fn prompt(text: &str) -> Option<String> {
    print!("{text}");
    io::stdout().flush().ok()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).ok()? == 0 {
        return None;
    }
    Some(line.trim().to_string())
}

fn print_result(result: &Result<Message, ResolutionError>) {
    match result {
        Ok(response) => print_response(response),
        Err(error) => println!("; {error}"),
    }
}

fn print_response(response: &Message) {
    println!(
        ";; ->>HEADER<<- opcode: {}, status: {}, id: {}",
        response.header.opcode, response.header.rcode, response.header.id
    );

    if !response.questions.is_empty() {
        println!("\n;; QUESTION");
        for question in &response.questions {
            println!("{}\t\t{}\t{}", question.name, question.qclass, question.qtype);
        }
    }

    print_section("ANSWER", &response.answers);
    print_section("AUTHORITY", &response.authority);
    print_section("ADDITIONAL", &response.additional);
}

fn print_section(heading: &str, rrs: &[ResourceRecord]) {
    if rrs.is_empty() {
        return;
    }

    println!("\n;; {heading}");
    for rr in rrs {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            rr.name,
            rr.ttl,
            rr.rclass,
            rr.rtype_with_data.rtype(),
            rr.rtype_with_data
        );
    }
}
