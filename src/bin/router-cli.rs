use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "router-cli")]
#[command(about = "Inspection CLI for the CDN traffic router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3333")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot generation and topology counts
    Status,
    /// Show routing tallies
    Stats,
    /// Route an HTTP request
    RouteHttp {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        secure: bool,
        #[arg(long)]
        steering_option: Option<String>,
    },
    /// Route a DNS query
    RouteDns {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        name: String,
        #[arg(long = "type", default_value = "A")]
        query_type: String,
    },
    /// Cache a coverage zone client hashes to
    CoverageZone {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        delivery_service: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        deep: bool,
    },
    /// Cache a geolocated client hashes to
    Geolocation {
        #[arg(long)]
        ip: String,
        #[arg(long)]
        delivery_service: String,
        #[arg(long)]
        path: String,
    },
    /// Steering target a path hashes to
    Steering {
        #[arg(long)]
        delivery_service: String,
        #[arg(long)]
        path: String,
    },
    /// Hash key a regex extracts from a path
    Pattern {
        #[arg(long)]
        regex: String,
        #[arg(long)]
        path: String,
    },
    /// Apply a health feed document
    PushState {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let get = |endpoint: &str| client.get(format!("{}{}", cli.url, endpoint));

    let request = match cli.command {
        Commands::Status => get("/crs/status"),
        Commands::Stats => get("/crs/stats"),
        Commands::RouteHttp { ip, host, path, query, secure, steering_option } => {
            let mut params = vec![("ip", ip), ("host", host), ("path", path), ("secure", secure.to_string())];
            params.extend(query.map(|q| ("query", q)));
            params.extend(steering_option.map(|o| ("steeringOption", o)));
            get("/crs/route/http").query(&params)
        }
        Commands::RouteDns { ip, name, query_type } => {
            get("/crs/route/dns").query(&[("ip", ip), ("name", name), ("type", query_type)])
        }
        Commands::CoverageZone { ip, delivery_service, path, deep } => get("/crs/consistenthash/cache/coveragezone").query(&[
            ("ip", ip),
            ("deliveryServiceId", delivery_service),
            ("requestPath", path),
            ("deep", deep.to_string()),
        ]),
        Commands::Geolocation { ip, delivery_service, path } => get("/crs/consistenthash/cache/geolocation")
            .query(&[("ip", ip), ("deliveryServiceId", delivery_service), ("requestPath", path)]),
        Commands::Steering { delivery_service, path } => get("/crs/consistenthash/deliveryservice")
            .query(&[("deliveryServiceId", delivery_service), ("requestPath", path)]),
        Commands::Pattern { regex, path } => {
            get("/crs/consistenthash/patternbased/regex").query(&[("regex", regex), ("requestPath", path)])
        }
        Commands::PushState { file } => {
            let body = tokio::fs::read_to_string(&file).await?;
            client
                .post(format!("{}/crs/state", cli.url))
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
        }
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: router returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
