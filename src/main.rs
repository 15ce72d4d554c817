use alerter::{TelegramAlerter, run_alerter_service};
use anyhow::Context;
use chain_client::RpcChainClient;
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, ConfigArgs, init_tracing, load_config};
use core_types::{PortfolioId, SystemClock};
use engine::RebalancingScheduler;
use rust_decimal::Decimal;
use std::sync::Arc;

/// The main entry point for the portfolio rebalancer.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; every setting has a file or default fallback.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli.config.config)
        .with_context(|| format!("Failed to load {}", cli.config.config.display()))?;
    let _log_guard = init_tracing(&config.logging).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Evaluate(args) => handle_evaluate(config, args).await,
        Commands::CheckConfig => handle_check_config(&config),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Keeps a fleet of on-chain portfolios close to their target allocations.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted with Ctrl-C.
    Run,
    /// Evaluate portfolios once without submitting anything.
    Evaluate(EvaluateArgs),
    /// Validate the configuration and print the managed portfolios.
    CheckConfig,
}

#[derive(Parser)]
struct EvaluateArgs {
    /// Only evaluate this portfolio. Defaults to every configured portfolio.
    #[arg(long)]
    portfolio: Option<String>,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn build_scheduler(config: &Config) -> anyhow::Result<Arc<RebalancingScheduler>> {
    let chain = Arc::new(RpcChainClient::new(&config.chain).context("Failed to build the chain client")?);
    let scheduler = RebalancingScheduler::new(config, chain.clone(), Arc::new(SystemClock))?
        .with_market(chain);
    let scheduler = Arc::new(scheduler);

    for portfolio in &config.portfolios {
        scheduler
            .add_portfolio(portfolio.clone())
            .await
            .with_context(|| format!("Failed to register portfolio '{}'", portfolio.id))?;
    }
    Ok(scheduler)
}

async fn handle_run(config: Config) -> anyhow::Result<()> {
    let scheduler = build_scheduler(&config).await?;
    tracing::info!(
        portfolios = config.portfolios.len(),
        rpc_url = %config.chain.rpc_url,
        "Scheduler configured."
    );

    if let Some(alerter) = TelegramAlerter::new(&config.telegram) {
        tokio::spawn(run_alerter_service(alerter, scheduler.events().subscribe()));
    }

    scheduler.start().await;
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    tracing::info!("Shutdown requested.");
    scheduler.stop().await;

    let status = scheduler.status().await;
    tracing::info!(
        total_rebalances = status.total_rebalances,
        recent_rebalances = status.recent_rebalances,
        "Scheduler shut down."
    );
    Ok(())
}

async fn handle_evaluate(config: Config, args: EvaluateArgs) -> anyhow::Result<()> {
    let scheduler = build_scheduler(&config).await?;
    let ids = match args.portfolio {
        Some(id) => vec![PortfolioId::from(id)],
        None => scheduler.portfolio_ids().await,
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Portfolio",
        "Total value",
        "Max deviation",
        "Urgency",
        "Est. cost",
        "Improvement",
        "Decision",
    ]);

    for id in ids {
        match scheduler.evaluate_portfolio(&id).await {
            Ok(evaluation) => {
                let row = match &evaluation.opportunity {
                    Some(o) => vec![
                        id.to_string(),
                        evaluation.snapshot.total_value.round_dp(2).to_string(),
                        pct(o.max_deviation),
                        o.urgency.to_string(),
                        o.estimated_impact.estimated_cost.round_dp(6).to_string(),
                        o.estimated_impact.expected_improvement.round_dp(6).to_string(),
                        if evaluation.would_execute { "rebalance" } else { "skip (cost)" }.to_string(),
                    ],
                    None => vec![
                        id.to_string(),
                        evaluation.snapshot.total_value.round_dp(2).to_string(),
                        "-".to_string(),
                        "-".to_string(),
                        "-".to_string(),
                        "-".to_string(),
                        "within tolerance".to_string(),
                    ],
                };
                table.add_row(row);
            }
            Err(e) => {
                table.add_row(vec![
                    id.to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    format!("error: {e}"),
                ]);
            }
        }
    }

    println!("{table}");
    Ok(())
}

fn handle_check_config(config: &Config) -> anyhow::Result<()> {
    println!(
        "Configuration OK: {} portfolio(s), scan every {}s, report every {}s.",
        config.portfolios.len(),
        config.scheduler.scan_interval_ms / 1000,
        config.scheduler.report_interval_ms / 1000,
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Portfolio", "Targets", "Threshold", "Interval", "Risk"]);
    for portfolio in &config.portfolios {
        let targets = portfolio
            .target_allocation
            .iter()
            .map(|(asset, weight)| format!("{asset} {}", pct(*weight)))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            portfolio.id.to_string(),
            targets,
            pct(portfolio.min_deviation_threshold),
            format!("{}s", portfolio.interval_ms / 1000),
            format!("{:?}", portfolio.risk_tolerance),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn pct(fraction: Decimal) -> String {
    format!("{}%", (fraction * Decimal::ONE_HUNDRED).round_dp(2).normalize())
}
