use anyhow::Result;
use lizard_connector::callbacks::json_saver;
use lizard_connector::{Client, DEFAULT_PAGINATED_PAGE_SIZE, Parsed, QueryParams, queries};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure the portal via env vars or a `.lizardrc` file; RUST_LOG=debug shows requests.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = Client::from_env()?.with_progress(true);
    let timeseries = client.endpoint("timeseries")?;

    let mut query = QueryParams::new();
    query.update(queries::in_bbox((51.9, 4.3), (52.1, 4.6), Some("timeseries")))?;
    query.update("name__icontains=waterstand")?;

    let mut pages = timeseries.download_paginated(DEFAULT_PAGINATED_PAGE_SIZE, &query)?;
    if let Some(first) = pages.next() {
        let first = first?;
        println!("{} time series in total", pages.total_count().unwrap_or(0));
        if let Parsed::Scientific(sci) = &first {
            println!("columns: {}", sci.metadata.columns.join(", "));
        }
    }

    let handle = timeseries.download_async(&query, json_saver("timeseries".into()), None)?;
    match handle.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("async download thread panicked"),
    }
    Ok(())
}
