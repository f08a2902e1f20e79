use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::future::join_all;
use reqwest::StatusCode;

/// Fire concurrent requests at a paced endpoint and report the spacing.
#[derive(Parser)]
#[command(name = "pace-probe")]
#[command(about = "Measure admission spacing of a rate-pacer endpoint", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081/rate")]
    url: String,

    /// Number of concurrent requests
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: usize,

    /// Upstream traceparent to send with every request
    #[arg(long)]
    traceparent: Option<String>,

    /// Upstream baggage to send with every request
    #[arg(long)]
    baggage: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let start = Instant::now();

    let requests = (0..cli.requests).map(|_| {
        let mut request = client.get(&cli.url);
        if let Some(traceparent) = &cli.traceparent {
            request = request.header("traceparent", traceparent);
        }
        if let Some(baggage) = &cli.baggage {
            request = request.header("baggage", baggage);
        }
        async move {
            let result = request.send().await.map(|res| res.status());
            (start.elapsed(), result)
        }
    });

    let mut results = join_all(requests).await;
    results.sort_by_key(|(elapsed, _)| *elapsed);

    let mut previous: Option<Duration> = None;
    let mut failures = 0;
    for (elapsed, result) in &results {
        let gap = previous.map(|p| elapsed.saturating_sub(p));
        previous = Some(*elapsed);
        match result {
            Ok(status) => {
                if *status != StatusCode::OK {
                    failures += 1;
                }
                println!("{:>10.3?}  gap {:>10.3?}  {}", elapsed, gap.unwrap_or_default(), status);
            }
            Err(error) => {
                failures += 1;
                println!("{:>10.3?}  error: {}", elapsed, error);
            }
        }
    }

    let total = start.elapsed();
    println!("-------------------------");
    println!("Requests:      {}", results.len());
    println!("Non-200:       {}", failures);
    println!("Total elapsed: {:?}", total);
    if results.len() > 1 {
        println!(
            "Observed rate: {:.2} req/s",
            (results.len() - 1) as f64 / total.as_secs_f64()
        );
    }

    Ok(())
}
