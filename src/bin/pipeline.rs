use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use relay_lob::clock::LatencySummary;
use relay_lob::{AckPolicy, ClientOrder, FlowConfig, OrderFlow, Pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run the threaded pipeline against synthetic order flow.
#[derive(Parser, Debug)]
#[command(name = "pipeline")]
struct Args {
    /// JSON pipeline configuration; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Client orders to submit across all participants
    #[arg(long, default_value_t = 1_000_000)]
    orders: u64,

    /// Acknowledge every trader instead of only the primary one
    #[arg(long)]
    ack_all: bool,

    #[arg(long)]
    channel_capacity: Option<usize>,

    #[arg(long)]
    subscribers: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Stop draining once nothing arrives for this many milliseconds
    #[arg(long, default_value_t = 100)]
    idle_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(capacity) = args.channel_capacity {
        config.channel_capacity = capacity;
    }
    if let Some(subscribers) = args.subscribers {
        config.subscribers = subscribers;
    }
    if args.ack_all {
        config.ack_policy = AckPolicy::All;
    }

    // One flow per order source; trader ids follow the source index
    let mut flows: Vec<OrderFlow> = (0..config.order_sources)
        .map(|source| {
            OrderFlow::new(FlowConfig {
                trader_id: source as u16,
                seed: args.seed.wrapping_add(source as u64),
                tick_size: config.grid.tick_size,
                ..FlowConfig::default()
            })
        })
        .collect();
    let mut pending: Vec<Option<ClientOrder>> = vec![None; flows.len()];

    let (pipeline, mut endpoints) = Pipeline::launch(&config)?;
    info!(orders = args.orders, "feeding synthetic flow");
    pipeline.start();

    let started = Instant::now();
    let mut submitted = 0u64;
    let mut acks = 0u64;
    let mut market_data = 0u64;
    let mut last_activity = Instant::now();
    let idle_limit = Duration::from_millis(args.idle_ms);

    loop {
        let mut active = false;

        for (source, producer) in endpoints.orders.iter_mut().enumerate() {
            if submitted >= args.orders {
                break;
            }
            let order = pending[source]
                .take()
                .unwrap_or_else(|| flows[source].next_order());
            match producer.push(order) {
                Ok(()) => {
                    submitted += 1;
                    active = true;
                }
                Err(order) => pending[source] = Some(order),
            }
        }

        while let Some(ack) = endpoints.client_acks.pop() {
            if let Some(flow) = flows.get_mut(ack.trader_id as usize) {
                flow.on_ack(&ack);
            }
            acks += 1;
            active = true;
        }
        for feed in endpoints.market_data.iter_mut() {
            while feed.pop().is_some() {
                market_data += 1;
                active = true;
            }
        }

        if active {
            last_activity = Instant::now();
        } else if submitted >= args.orders && last_activity.elapsed() >= idle_limit {
            break;
        } else {
            std::hint::spin_loop();
        }
    }

    let elapsed = started.elapsed().saturating_sub(idle_limit);
    let report = pipeline.shutdown()?;
    let hop: LatencySummary = report.engine.hop_latency;

    println!("\n=== Pipeline Report ===");
    println!("Submitted:      {}", submitted);
    println!("Forwarded:      {}", report.gateway.forwarded);
    println!("Gateway reject: {}", report.gateway.rejected);
    println!("Unknown refs:   {}", report.gateway.unknown);
    println!("Processed:      {}", report.engine.processed);
    println!("Trades:         {}", report.engine.stats.trades);
    println!("Volume:         {}", report.engine.stats.volume);
    println!("Self-trade:     {}", report.engine.stats.self_trade_kills);
    println!("Client acks:    {}", acks);
    println!("Market data:    {}", market_data);
    println!("Dropped acks:   {}", report.engine.dropped_acks);
    println!("Dropped deltas: {}", report.engine.dropped_deltas);
    println!("Live orders:    {}", report.engine.live_orders);
    println!(
        "Throughput:     {:.2} orders/sec",
        report.engine.processed as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("--- gateway -> engine hop (ns) ---");
    println!("P50:    {:8}", hop.p50);
    println!("P99:    {:8}", hop.p99);
    println!("P99.9:  {:8}", hop.p999);
    println!("Max:    {:8}", hop.max);
    println!("Mean:   {:11.1}", hop.mean);
    Ok(())
}
