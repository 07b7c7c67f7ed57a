use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use relay_lob::{AckPolicy, BookDelta, ClientAck, ClientOrder, Pipeline, PipelineConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Push client orders from a CSV file through the pipeline and print what
/// comes back.
///
/// Expected header: `order_id,side,kind,price,qty,trader_id`, with `side` one
/// of `bid`/`ask` and `kind` one of `create`/`modify`/`delete`.
#[derive(Parser, Debug)]
#[command(name = "replay")]
struct Args {
    /// CSV file of client orders
    input: PathBuf,

    /// JSON pipeline configuration; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Acknowledge every trader instead of only the primary one
    #[arg(long)]
    ack_all: bool,

    /// Stop once nothing arrives for this many milliseconds
    #[arg(long, default_value_t = 200)]
    idle_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.ack_all {
        config.ack_policy = AckPolicy::All;
    }
    // Replay preserves file order, so everything goes through one source
    config.order_sources = 1;
    config.subscribers = 1;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&args.input)?;
    let orders = reader
        .deserialize::<ClientOrder>()
        .collect::<Result<Vec<_>, _>>()?;
    info!(orders = orders.len(), path = %args.input.display(), "loaded replay file");

    let (pipeline, mut endpoints) = Pipeline::launch(&config)?;
    pipeline.start();

    let mut next = 0usize;
    let mut last_activity = Instant::now();
    let idle_limit = Duration::from_millis(args.idle_ms);
    let (mut acks, mut deltas) = (0u64, 0u64);

    loop {
        let mut active = false;

        if let Some(order) = orders.get(next) {
            if endpoints.orders[0].push(*order).is_ok() {
                next += 1;
                active = true;
            }
        }
        while let Some(ack) = endpoints.client_acks.pop() {
            print_ack(&ack)?;
            acks += 1;
            active = true;
        }
        for feed in endpoints.market_data.iter_mut() {
            while let Some(delta) = feed.pop() {
                print_delta(&delta);
                deltas += 1;
                active = true;
            }
        }

        if active {
            last_activity = Instant::now();
        } else if next >= orders.len() && last_activity.elapsed() >= idle_limit {
            break;
        } else {
            std::hint::spin_loop();
        }
    }

    let report = pipeline.shutdown()?;
    if report.engine.dropped_acks > 0 || report.engine.dropped_deltas > 0 {
        warn!("output was dropped; raise channel_capacity");
    }
    info!(
        submitted = next,
        acks,
        deltas,
        trades = report.engine.stats.trades,
        rejected = report.gateway.rejected + report.engine.stats.rejected,
        "replay finished"
    );
    Ok(())
}

fn print_ack(ack: &ClientAck) -> Result<(), serde_json::Error> {
    println!("ack   {}", serde_json::to_string(ack)?);
    Ok(())
}

fn print_delta(delta: &BookDelta) {
    println!(
        "delta {:?} id={} side={:?} price={} qty={}",
        delta.kind, delta.order_id, delta.side, delta.price, delta.qty
    );
}
