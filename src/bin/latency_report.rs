use std::error::Error;
use std::time::Instant;

use clap::Parser;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use relay_lob::clock::{self, LatencySummary};
use relay_lob::{AckPolicy, BookConfig, Engine, OrderRequest, OutputEvent, RequestKind, Side};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Single-thread matching latency, measured per request.
#[derive(Parser, Debug)]
#[command(name = "latency-report")]
struct Args {
    /// Requests to time
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u32,

    /// Share of requests that cancel a resting order
    #[arg(long, default_value_t = 0.3)]
    cancel_ratio: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Core to pin the measuring thread to
    #[arg(long)]
    core: Option<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    println!("Preparing Latency Benchmark...");
    relay_lob::pipeline::pin_current_thread("latency-report", args.core);

    let config = BookConfig {
        price_ticks: 20_000,
        max_orders: args.iterations.max(1),
        level_capacity: 16,
    };
    let mut engine = Engine::new(&config, AckPolicy::All);
    engine.warm_up();

    let mut histogram = clock::latency_histogram()?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut events: Vec<OutputEvent> = Vec::with_capacity(64);
    let mut resting: Vec<u32> = Vec::new();

    println!("Running {} iterations...", args.iterations);
    let mut total_duration = std::time::Duration::ZERO;

    for order_id in 0..args.iterations {
        let request = if !resting.is_empty() && rng.gen_bool(args.cancel_ratio) {
            let target = resting.swap_remove(rng.gen_range(0..resting.len()));
            OrderRequest {
                order_id: target,
                kind: RequestKind::Delete,
                ..OrderRequest::default()
            }
        } else {
            resting.push(order_id);
            OrderRequest {
                order_id,
                side: if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask },
                kind: RequestKind::Create,
                price: rng.gen_range(9_950..10_050),
                qty: rng.gen_range(1..100),
                trader_id: rng.gen_range(0..100),
                ..OrderRequest::default()
            }
        };

        events.clear();

        // Critical measurement section
        let start = Instant::now();
        engine.process_into(&request, &mut events);
        std::hint::black_box(&events);
        let elapsed = start.elapsed();

        histogram.saturating_record(elapsed.as_nanos() as u64);
        total_duration += elapsed;
    }

    let summary = LatencySummary::from_histogram(&histogram);
    info!(
        live_orders = engine.live_orders(),
        state_hash = engine.state_hash(),
        "workload finished"
    );

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", args.iterations);
    println!(
        "Throughput: {:.2} ops/sec",
        args.iterations as f64 / total_duration.as_secs_f64().max(f64::EPSILON)
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", summary.min);
    println!("P50:    {:6} ns", summary.p50);
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", summary.p99);
    println!("P99.9:  {:6} ns", summary.p999);
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", summary.max);
    println!("Mean:   {:9.1} ns", summary.mean);
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }
    Ok(())
}
