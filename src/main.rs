use anyhow::{bail, Context};
use payflow::backend::http::HttpBackend;
use payflow::backend::types::QuoteKind;
use payflow::config::AppConfig;
use payflow::logging::init_tracing;
use payflow::payment_code::PaymentCodeInterpreter;
use payflow::services::{QuoteResult, QuoteService, QuoteView};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

const USAGE: &str = "usage: payflow <payment-code> [source-asset] [amount]";

/// Resolves on Ctrl+C. A handler that cannot be installed never resolves.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, aborting");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    let mut args = std::env::args().skip(1);
    let Some(code) = args.next() else {
        bail!(USAGE);
    };
    let source_asset = args.next();
    let amount = args
        .next()
        .map(|raw| Decimal::from_str(raw.trim()))
        .transpose()
        .context("amount must be a decimal number")?;

    tokio::select! {
        result = run(config, code, source_asset, amount) => result,
        _ = shutdown_signal() => Ok(()),
    }
}

async fn run(
    config: AppConfig,
    code: String,
    source_asset: Option<String>,
    amount: Option<Decimal>,
) -> anyhow::Result<()> {
    let backend = Arc::new(
        HttpBackend::new(config.backend.clone()).context("failed to build backend client")?,
    );

    let interpreter = PaymentCodeInterpreter::new(config.interpreter.clone(), backend.clone());
    let draft = match interpreter.parse(&code).await {
        Ok(draft) => draft,
        Err(e) => {
            warn!(error = %e, "payment code rejected");
            bail!(e.user_message());
        }
    };
    println!("{}", serde_json::to_string_pretty(&draft)?);

    let Some(source_asset) = source_asset else {
        return Ok(());
    };

    let requested = match amount {
        Some(amount) if draft.allows_open_amount() => amount,
        Some(_) => bail!("the amount of this payment code is fixed"),
        None => draft.requested_amount,
    };

    let quotes = QuoteService::new(backend);
    match quotes
        .get_quote(
            &source_asset.to_uppercase(),
            &draft.asset_code,
            requested,
            QuoteKind::FixedDestination,
        )
        .await
        .context("quote request failed")?
    {
        QuoteResult::Quote(quote) => {
            let view = QuoteView::from(&quote);
            info!(
                merchant = %draft.merchant_name,
                source = %view.source_asset,
                total = %view.total,
                destination_amount = %view.destination_amount,
                "payment priced"
            );
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        QuoteResult::NoRoute => {
            warn!(
                from = %source_asset,
                to = %draft.asset_code,
                "conversion unavailable"
            );
            println!("conversion from {} is unavailable", source_asset);
        }
    }

    Ok(())
}
