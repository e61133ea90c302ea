//! Places an outbound call that is answered by the running Voxline server.
//!
//! Usage: `voxline-call [+15551234567]`. Without an argument the number is
//! read from stdin. Configuration comes from `VOXLINE_CONFIG_PATH` (default
//! `config.toml`) and the usual environment overrides.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use voxline_server::config;
use voxline_server::telephony::{voice_webhook_url, TelephonyClient};

fn read_number() -> io::Result<String> {
    if let Some(arg) = std::env::args().nth(1).filter(|a| !a.trim().is_empty()) {
        return Ok(arg.trim().to_string());
    }
    print!("Enter the phone number to call (with country code, e.g. +15551234567): ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("VOXLINE_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = match config::load_config(Some(&config_path)) {
        Ok((config, origin)) => {
            tracing::info!(path = %config_path, origin = origin.as_str(), "loaded configuration");
            config
        }
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.server.public_url.is_empty() {
        tracing::error!("no public URL configured (set VOXLINE_PUBLIC_URL or NGROK_URL)");
        return ExitCode::FAILURE;
    }
    let webhook = voice_webhook_url(&config.server.public_url);

    let client = match TelephonyClient::new(config.telephony) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // An unreachable webhook is reported but does not stop the call.
    match client.check_webhook(&webhook).await {
        Ok(()) => tracing::info!(url = %webhook, "webhook is reachable"),
        Err(e) => tracing::warn!("{}", e),
    }

    let to = match read_number() {
        Ok(number) => number,
        Err(e) => {
            tracing::error!("failed to read phone number: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match client.place_call(&to, &webhook).await {
        Ok(call) => {
            println!("Call SID: {}", call.sid);
            println!("Call status: {}", call.status);
            println!("Answer your phone and start speaking.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("failed to place call: {}", e);
            ExitCode::FAILURE
        }
    }
}
