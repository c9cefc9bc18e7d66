use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::prelude::*;

use dash_send_core::config::AdapterConfig;
use dash_send_core::ledger::LedgerView;
use dash_send_core::notification::LedgerNotification;
use dash_send_core::selection::{SendRequest, TransactionBuilder};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewConfig {
    adapter: AdapterConfig,
    /// JSON lines of ledger notifications
    notifications: PathBuf,
    change_address: String,
    request: SendRequest,
}

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file
    #[clap(long, value_parser)]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let result = _main().await;
    result.unwrap();
}

async fn _main() -> anyhow::Result<()> {
    // Start logging setup block
    let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();

    tracing_subscriber::registry().with(fmt_layer).init();

    let Cli { config_path } = Cli::parse();

    tracing::info!("Config file {:?}", config_path);
    let file = File::open(&config_path).with_context(|| {
        format!(
            "Cannot read config file {path}",
            path = config_path.display()
        )
    })?;
    let config: PreviewConfig = serde_yaml::from_reader(file).with_context(|| {
        format!(
            "Cannot parse config file {path}",
            path = config_path.display()
        )
    })?;

    let params = config.adapter.chain_params();
    let ledger = LedgerView::new(&params, tracing::info_span!("ledger"));
    let builder = TransactionBuilder::for_chain(params.clone());

    let notifications = File::open(&config.notifications).with_context(|| {
        format!(
            "Cannot read notifications {path}",
            path = config.notifications.display()
        )
    })?;
    for (line_number, line) in BufReader::new(notifications).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let notification: LedgerNotification = serde_json::from_str(&line)
            .with_context(|| format!("Cannot parse notification at line {}", line_number + 1))?;
        ledger.apply(notification)?;
    }

    let balances = ledger.balance()?;
    let available = ledger.available_balance(None, builder.estimator(), params.fee_rate)?;
    tracing::info!(
        "confirmed: {}, unconfirmed: {}, available: {}",
        balances.confirmed.to_decimal(params.decimals),
        balances.unconfirmed.to_decimal(params.decimals),
        available.to_decimal(params.decimals)
    );

    let request = config.request;
    let snapshot = ledger.snapshot(None)?;
    match builder.fee(
        request.amount,
        Some(request.address.as_str()),
        &request.plugin_data,
        request.fee_rate,
        snapshot.clone(),
    ) {
        Ok(fee) => tracing::info!("fee preview: {}", fee.to_decimal(params.decimals)),
        Err(err) => tracing::info!("fee preview unavailable: {:?}", err.kind()),
    }

    match builder.build(&request, snapshot, &config.change_address) {
        Ok(candidate) => {
            tracing::info!("candidate transaction: {}", candidate);
            println!("{}", serde_json::to_string_pretty(&candidate)?);
        }
        Err(err) => {
            tracing::info!("can't build transaction ({:?}): {}", err.kind(), err);
        }
    }

    Ok(())
}
