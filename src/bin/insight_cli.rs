use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use store_insights_lib::analysis::{format_short_pct, format_usd};
use store_insights_lib::commands;
use store_insights_lib::models::StoreId;
use store_insights_lib::{init_tracing, AppConfig, AppState};

#[derive(Parser, Debug)]
#[command(name = "insight_cli", about = "Store sales forecasts and insights from the terminal")]
struct Cli {
    /// Overrides API_BASE.
    #[arg(long, env = "API_BASE")]
    api_base: Option<String>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stores with enough history to forecast.
    Stores {
        /// Skip the persisted list and ask the server again.
        #[arg(long)]
        retry: bool,
    },
    /// History and forecast for one store.
    Forecast { store: StoreId },
    /// Explain the store's forecast, or one month of it with --date.
    Explain {
        store: StoreId,
        /// bullets, narrative or actions
        #[arg(long)]
        style: Option<String>,
        /// simple, balanced, advanced or pro (6th, 9th, 12th also accepted)
        #[arg(long)]
        level: Option<String>,
        /// YYYY-MM or YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Category mix of the latest month and its insight.
    Categories { store: StoreId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(base) = cli.api_base {
        config.api_base = base.trim_end_matches('/').to_string();
    }
    let state = AppState::init(config).await.context("failed to initialize")?;

    match cli.command {
        Command::Stores { retry } => {
            let listing = if retry {
                commands::retry_stores(&state).await
            } else {
                commands::get_stores(&state).await
            }
            .map_err(|e| anyhow!(e))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                if let Some(warning) = &listing.warning {
                    eprintln!("⚠️  {}", warning);
                }
                for store in &listing.stores {
                    println!("{:>6}  {}", store.value, store.label);
                }
            }
        }
        Command::Forecast { store } => {
            let bundle = commands::get_forecast(&state, store).await.map_err(|e| anyhow!(e))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&bundle)?);
            } else {
                println!("{:<12} | {:<8} | {:>14}", "Date", "Source", "Sales");
                println!("{}", "-".repeat(40));
                for p in &bundle.timeline {
                    println!("{:<12} | {:<8} | {:>14}", p.date, p.source.as_str(), format_usd(p.value));
                }
            }
        }
        Command::Explain { store, style, level, date } => match date {
            Some(date) => {
                let view = commands::explain_point(&state, store, &date).await.map_err(|e| anyhow!(e))?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&view)?);
                } else {
                    println!("{} ({})", view.date, format_usd(view.value));
                    println!("{}", view.text);
                }
            }
            None => {
                let panel = commands::explain_forecast(&state, store, style, level)
                    .await
                    .map_err(|e| anyhow!(e))?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&panel)?);
                } else {
                    if panel.fallback {
                        eprintln!("(service returned no explanation; showing local summary)");
                    }
                    println!("{}", panel.text);
                }
            }
        },
        Command::Categories { store } => {
            let report = commands::get_category_insight(&state, store).await.map_err(|e| anyhow!(e))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Categories for {}", report.month);
                for s in &report.slices {
                    println!("{:<26} {:>12} {:>6}%", s.label, format_usd(s.value), format_short_pct(s.share * 100.0));
                }
                println!();
                println!("{}", report.text);
            }
        }
    }

    Ok(())
}
