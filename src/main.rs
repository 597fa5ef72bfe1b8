//! CDN Traffic Router
//!
//! Decides which edge cache serves each client request, answering DNS
//! queries with cache addresses and HTTP requests with redirect URLs.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                    TRAFFIC ROUTER                     │
//!                    │                                                       │
//!   DNS / HTTP       │  ┌──────────┐   ┌─────────────┐   ┌───────────────┐  │
//!   request ─────────┼─▶│  state   │──▶│   routing   │──▶│    locate     │  │
//!                    │  │ (handle) │   │  cascade    │   │ CZ / geo / fed│  │
//!                    │  └──────────┘   └──────┬──────┘   └───────────────┘  │
//!                    │                        │                              │
//!                    │                        ▼                              │
//!                    │  ┌──────────┐   ┌─────────────┐   ┌───────────────┐  │
//!   answer ◀─────────┼──│  result  │◀──│    hash     │◀──│    policy     │  │
//!                    │  │ records/ │   │ consistent  │   │ anon / region │  │
//!                    │  │   URLs   │   │  selection  │   └───────────────┘  │
//!                    │  └──────────┘   └─────────────┘                       │
//!                    │                                                       │
//!                    │  ┌─────────────────────────────────────────────────┐ │
//!                    │  │             Cross-Cutting Concerns               │ │
//!                    │  │ ┌────────┐ ┌────────┐ ┌──────────┐ ┌──────────┐ │ │
//!                    │  │ │ config │ │ health │ │ observa- │ │lifecycle │ │ │
//!                    │  │ │ +watch │ │  feed  │ │  bility  │ │ signals  │ │ │
//!                    │  │ └────────┘ └────────┘ └──────────┘ └──────────┘ │ │
//!                    │  └─────────────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "cdn-router")]
#[command(about = "CDN traffic router", long_about = None)]
struct Args {
    /// Router configuration file (TOML).
    #[arg(short, long, default_value = "router.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    cdn_router::lifecycle::run(&args.config).await?;
    Ok(())
}
