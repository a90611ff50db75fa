//! Command-line interface for galena-pool.
//!
//! This binary provides a CLI for monitoring the pool daemon via the HTTP
//! statistics API.

use std::env;

use anyhow::Result;

use galena_pool::api_client;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: galena-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status    Show pool status");
        eprintln!("  workers   Show per-worker statistics");
        eprintln!("  blocks    Show blocks found by the pool");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  GALENA_API_URL    API base URL (default: {})", api_client::DEFAULT_BASE_URL);
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "workers" => cmd_workers().await?,
        "blocks" => cmd_blocks().await?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring GALENA_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("GALENA_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

/// Print a summary of the current pool state.
async fn cmd_status() -> Result<()> {
    let client = make_client();
    let pool = client.get_pool().await?;

    println!("Uptime:   {}", pool.uptime_human);
    println!("Hashrate: {}", pool.hashrate_human);
    println!(
        "Shares:   {} valid, {} invalid, {} stale",
        pool.valid_shares, pool.invalid_shares, pool.stale_shares
    );
    println!("Blocks:   {}", pool.blocks_found);
    println!(
        "Workers:  {} active of {} known ({} sessions)",
        pool.active_workers, pool.total_workers, pool.connected_sessions
    );
    println!("Address:  {}", pool.reward_address);

    Ok(())
}

/// Print the worker table.
async fn cmd_workers() -> Result<()> {
    let client = make_client();
    let workers = client.get_workers().await?;

    if workers.is_empty() {
        println!("No workers have connected yet.");
        return Ok(());
    }

    for worker in workers {
        let marker = if worker.active { "" } else { " (inactive)" };
        println!("{}{marker}", worker.name);
        println!("  shares:     {} valid, {} invalid, {} stale",
            worker.valid_shares, worker.invalid_shares, worker.stale_shares);
        println!("  difficulty: {}", worker.difficulty);
        println!("  hashrate:   {}", worker.hashrate_human);
        match worker.last_share_secs_ago {
            Some(ago) => println!("  last share: {ago}s ago"),
            None => println!("  last share: never"),
        }
    }

    Ok(())
}

/// Print blocks found by the pool.
async fn cmd_blocks() -> Result<()> {
    let client = make_client();
    let blocks = client.get_blocks().await?;

    if blocks.is_empty() {
        println!("No blocks found yet.");
        return Ok(());
    }

    for block in blocks {
        println!(
            "height {}  {}  by {}  ({}s ago)",
            block.height, block.hash, block.worker, block.found_secs_ago
        );
    }

    Ok(())
}
