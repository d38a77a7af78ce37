//! Load client CLI for the convolution front service.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use conv_load_test::{
    Args, ClientConfig, Dispatcher, HttpFrontClient, ManualInput, OutputFormat, ResultsReport,
    ValueMode,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let config = match ClientConfig::from_args(&args) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "FrontAddr field is mandatory");
            std::process::exit(1);
        }
    };

    info!(
        requests = config.request_count,
        "Welcome. Client will send {} requests in parallel.", config.request_count
    );

    let base_url = config.base_url()?;
    let service = HttpFrontClient::new(&base_url, &config.dispatch)
        .context("Could not connect to the front service")?;
    info!(endpoint = %service.endpoint(), "Front service client ready");

    let mut dispatcher = Dispatcher::new(config.clone(), Arc::new(service));
    if config.value_mode == ValueMode::Manual {
        dispatcher = dispatcher.with_manual_input(Arc::new(ManualInput::stdin()));
    }

    let results = dispatcher.run().await;

    match args.output {
        OutputFormat::Table => println!("{}", ResultsReport::format_table(&results.summary)),
        OutputFormat::Json => println!("{}", ResultsReport::format_json(&results.summary)?),
        OutputFormat::Quiet => {}
    }

    info!("All requests completed. Terminating. Goodbye.");
    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = fmt().with_env_filter(filter).with_target(false);
    let installed = if args.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
