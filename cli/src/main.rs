//! monwatch CLI — watch Monad block and log feeds from the terminal.
//!
//! Usage:
//! ```bash
//! # Watch speculative + standard heads on the public testnet
//! monwatch watch
//!
//! # Watch everything on a custom endpoint
//! monwatch watch --url wss://testnet-rpc.monad.xyz --all
//!
//! # Print network information
//! monwatch network
//! ```

use std::env;
use std::process;
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time;

use monwatch_core::net;
use monwatch_core::stats::StatsSnapshot;
use monwatch_core::SubscriptionKind;
use monwatch_engine::{ConnectionState, Engine, EngineConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "watch" => cmd_watch(&args[2..]).await,
        "network" => {
            cmd_network();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("monwatch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("monwatch {}", env!("CARGO_PKG_VERSION"));
    println!("Watch Monad block and log feeds from the terminal\n");
    println!("USAGE:");
    println!("    monwatch <COMMAND>\n");
    println!("COMMANDS:");
    println!("    watch      Stream blocks/logs and running stats");
    println!("    network    Print testnet information");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("WATCH FLAGS:");
    println!("    --url <URL>           Feed endpoint  [default: {}]", net::TESTNET_ENDPOINT);
    println!("    --heads               Subscribe to standard newHeads");
    println!("    --speculative         Subscribe to monadNewHeads");
    println!("    --logs                Subscribe to standard logs");
    println!("    --speculative-logs    Subscribe to monadLogs");
    println!("    --all                 Subscribe to all four streams");
    println!("    --stats-every <SECS>  Stats summary cadence  [default: 10]");
    println!();
    println!("With no stream flag, watch subscribes to speculative and standard heads.");
}

fn selected_kinds(args: &[String]) -> Vec<SubscriptionKind> {
    if has_flag(args, "--all") {
        return SubscriptionKind::ALL.to_vec();
    }
    let mut kinds = Vec::new();
    if has_flag(args, "--heads") {
        kinds.push(SubscriptionKind::StandardHeads);
    }
    if has_flag(args, "--speculative") {
        kinds.push(SubscriptionKind::SpeculativeHeads);
    }
    if has_flag(args, "--logs") {
        kinds.push(SubscriptionKind::StandardLogs);
    }
    if has_flag(args, "--speculative-logs") {
        kinds.push(SubscriptionKind::SpeculativeLogs);
    }
    if kinds.is_empty() {
        kinds = vec![
            SubscriptionKind::SpeculativeHeads,
            SubscriptionKind::StandardHeads,
        ];
    }
    kinds
}

async fn cmd_watch(args: &[String]) -> Result<(), String> {
    let url = parse_flag(args, "--url").unwrap_or_else(|| net::TESTNET_ENDPOINT.to_string());
    let stats_every = parse_flag(args, "--stats-every")
        .map(|s| s.parse::<u64>().map_err(|_| "--stats-every expects seconds"))
        .transpose()?
        .unwrap_or(10)
        .max(1);
    let kinds = selected_kinds(args);

    let mut engine = Engine::new(EngineConfig::default());
    let mut feed = engine.log().feed();

    engine.connect(&url).await.map_err(|e| e.to_string())?;
    for kind in &kinds {
        engine.subscribe(*kind).map_err(|e| e.to_string())?;
    }

    let mut events = engine
        .take_events()
        .ok_or("no event stream after connect")?;
    let period = Duration::from_secs(stats_every);
    let mut ticker = time::interval_at(time::Instant::now() + period, period);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some((session, event)) => {
                        engine.handle_event(session, event);
                        if engine.state() == ConnectionState::Disconnected {
                            break;
                        }
                    }
                    None => break,
                }
            }
            entry = feed.recv() => {
                match entry {
                    Ok(entry) => println!("{entry}"),
                    Err(RecvError::Lagged(skipped)) => {
                        eprintln!("(feed lagged, {skipped} entries skipped)");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = ticker.tick() => {
                println!("{}", stats_line(&engine));
            }
            _ = tokio::signal::ctrl_c() => {
                engine.disconnect();
                break;
            }
        }
    }

    // Drain what the engine logged during teardown.
    loop {
        match feed.try_recv() {
            Ok(entry) => println!("{entry}"),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    println!("{}", stats_line(&engine));
    Ok(())
}

fn stats_line(engine: &Engine) -> String {
    let s = engine.stats_snapshot();
    format!(
        "-- blocks: {} standard, {} speculative ({} proposed / {} finalized) | logs: {} | {} | subs: {} | uptime: {}",
        s.standard_blocks,
        s.speculative_blocks,
        s.proposed,
        s.finalized,
        s.logs,
        interval_summary(&s),
        engine.subscription_count(),
        format_uptime(engine.uptime()),
    )
}

fn interval_summary(s: &StatsSnapshot) -> String {
    match (s.min_interval_ms, s.max_interval_ms) {
        (Some(min), Some(max)) => format!(
            "block time: avg {}ms, min/max {min}/{max}ms",
            s.average_interval_ms
        ),
        _ => "block time: -".to_string(),
    }
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn cmd_network() {
    println!("Monad testnet\n");
    println!("  Endpoint:    {}", net::TESTNET_ENDPOINT);
    println!("  Chain ID:    {}", net::TESTNET_CHAIN_ID);
    println!("  Consensus:   {}", net::CONSENSUS);
    println!("  Block time:  ~{}ms", net::NOMINAL_BLOCK_TIME_MS);
    println!("  Streams:");
    for kind in net::SUPPORTED_STREAMS {
        println!("    {:<22} eth_subscribe [\"{}\"]", kind.to_string(), kind.param());
    }
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
