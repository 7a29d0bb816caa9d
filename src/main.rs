//! CafeBot entry point
//!
//! Usage: cafebot <update|config|notify-test|help>
//!
//! One scheduled run per invocation (cron/CI drives the schedule): fetch
//! all sources, reconcile, persist history, send the Telegram report.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

use cafebot::config::AppConfig;
use cafebot::history::PriceHistory;
use cafebot::notify::{format_report, TelegramNotifier};
use cafebot::reconcile::Reconciler;
use cafebot::sources::{
    self, CafeFFetcher, InvestingFetcher, PriceFetcher, VietstockFetcher, WebGiaFetcher,
};
use cafebot::types::Source;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "help".to_string());
    info!(command = %command, "🌟 CafeBot started");

    match command.as_str() {
        "update" => run_update().await,
        "notify-test" => run_notify_test().await,
        "config" => show_config(),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            error!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

/// Full run: fetch -> reconcile -> persist -> notify
async fn run_update() -> Result<()> {
    let cfg = load_validated_config()?;
    info!(config = %cfg.digest(), "Configuration loaded");

    let markets = cfg.markets()?;
    let params = cfg.reconcile_params()?;
    let client = sources::build_client(&cfg.fetch)?;

    let fetchers = build_fetchers(&cfg)?;
    info!(count = fetchers.len(), "📥 Fetching sources...");
    let readings = sources::fetch_all(fetchers, &client, &cfg.fetch).await;

    let history = PriceHistory::new(&cfg.history.data_dir)?;
    let priors = history.latest()?;

    let computed_at = Utc::now();
    let reconciler = Reconciler::new(params);
    let prices = reconciler.reconcile_all(&markets, &readings, &priors, computed_at);

    for price in &prices {
        info!(
            market = %price.market,
            value = price.value,
            confidence = price.confidence,
            sources = price.sources.len(),
            carried_forward = price.carried_forward,
            "Reconciled"
        );
    }

    history.append(&prices)?;

    let report = format_report(&prices, computed_at);
    if cfg.bot.dry_run {
        info!("Dry run, report not sent:\n{}", report);
    } else {
        let notifier = TelegramNotifier::from_env(client)?;
        notifier.send(&report).await?;
    }

    info!("✅ Price update completed");
    Ok(())
}

/// Send a plain test message to verify the Telegram wiring
async fn run_notify_test() -> Result<()> {
    let cfg = load_validated_config()?;
    let client = sources::build_client(&cfg.fetch)?;
    let notifier = TelegramNotifier::from_env(client)?;

    let message = format!(
        "🧪 *KIỂM TRA THÔNG BÁO*\n\n⏰ {}\n🤖 CafeBot hoạt động bình thường",
        Utc::now().format("%d/%m/%Y %H:%M UTC")
    );
    notifier.send(&message).await?;

    info!("✅ Test notification sent");
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = AppConfig::load()?;
    println!("{}", cfg.digest());
    match cfg.validate().and_then(|_| cfg.validate_env()) {
        Ok(()) => println!("✅ Configuration is valid"),
        Err(e) => {
            println!("❌ Configuration is invalid: {:#}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn load_validated_config() -> Result<AppConfig> {
    let cfg = AppConfig::load()?;
    cfg.validate().context("Configuration validation failed")?;
    cfg.validate_env().context("Environment validation failed")?;
    Ok(cfg)
}

fn build_fetchers(cfg: &AppConfig) -> Result<Vec<Arc<dyn PriceFetcher>>> {
    let mut fetchers: Vec<Arc<dyn PriceFetcher>> = Vec::new();
    for source in cfg.enabled_sources()? {
        let fetcher: Arc<dyn PriceFetcher> = match source {
            Source::Investing => Arc::new(InvestingFetcher::new(&cfg.fetch)),
            Source::CafeF => Arc::new(CafeFFetcher::new(&cfg.fetch)),
            Source::Vietstock => Arc::new(VietstockFetcher::new(&cfg.fetch)),
            Source::WebGia => Arc::new(WebGiaFetcher::new(&cfg.fetch)),
        };
        fetchers.push(fetcher);
    }
    Ok(fetchers)
}

fn print_usage() {
    println!(
        r#"☕ CafeBot - coffee price tracker

Commands:
  cafebot update        Run price update and send the Telegram report
  cafebot notify-test   Send a test notification
  cafebot config        Show current configuration and validate it
  cafebot help          Show this help

Environment:
  TELEGRAM_BOT_TOKEN    Bot token (required unless bot.dry_run)
  TELEGRAM_CHAT_ID      Target chat/channel id (required unless bot.dry_run)
  CAFEBOT_*             Config overrides, e.g. CAFEBOT_BOT__DRY_RUN=false

Scheduling is external: run `cafebot update` from cron or CI at the
desired report times (e.g. 8AM and 5PM Vietnam time)."#
    );
}
