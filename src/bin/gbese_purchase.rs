use std::collections::{HashMap, VecDeque};

use gbese_purchase::config::OrchestratorConfig;
use gbese_purchase::runner;
use gbese_purchase::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

fn print_help() {
    eprintln!(
        "\
gbese-purchase

USAGE:
  gbese-purchase <command> [options]

COMMANDS:
  run                             Link, verify KYC, mint, approve and purchase
  status                          Print linkage, KYC status, price, balance and allowance
  typed-data                      Print the eth_signTypedData_v4 payload for an attestation issued now

COMMON OPTIONS:
  --rpc-url <url>                 (defaults to env RPC_URL)
  --token-uri <uri>               (defaults to env TOKEN_URI)
  --compact                       Print single-line JSON

run OPTIONS:
  --fail-on-revert                Exit non-zero when the purchase reverts

ENV:
  RPC_URL, CHAIN_ID, OWNER_PRIVATE_KEY, BUYER_PRIVATE_KEY, ISSUER_PRIVATE_KEY,
  NFT_ADDRESS, TOKEN_ADDRESS, KYC_VERIFIER_ADDRESS, TOKEN_URI, MINT_RECIPIENT,
  KYC_DOMAIN_NAME, KYC_DOMAIN_VERSION, KYC_SIGNER_MODE (local|node), ISSUER_ADDRESS,
  ALLOWANCE_STRATEGY (direct|reset_then_approve), MINT_FAILURE_POLICY (fatal|continue),
  REUSE_EXISTING_MINT, READ_RETRIES, CONFIRMATIONS, CONFIRMATION_TIMEOUT_SECS
"
    );
}

#[derive(Debug, Default)]
struct Options {
    overrides: HashMap<&'static str, String>,
    compact: bool,
    fail_on_revert: bool,
}

fn parse_options(
    mut args: VecDeque<String>,
    allow_fail_on_revert: bool,
) -> anyhow::Result<Option<Options>> {
    let mut options = Options::default();

    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "--rpc-url" => {
                let value = args
                    .pop_front()
                    .ok_or_else(|| anyhow::anyhow!("missing value for --rpc-url"))?;
                options.overrides.insert("RPC_URL", value);
            }
            "--token-uri" => {
                let value = args
                    .pop_front()
                    .ok_or_else(|| anyhow::anyhow!("missing value for --token-uri"))?;
                options.overrides.insert("TOKEN_URI", value);
            }
            "--compact" => options.compact = true,
            "--fail-on-revert" if allow_fail_on_revert => options.fail_on_revert = true,
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    Ok(Some(options))
}

fn load_config(options: &Options) -> anyhow::Result<OrchestratorConfig> {
    let config = OrchestratorConfig::from_lookup(|key| {
        options
            .overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })?;
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{rendered}");
    Ok(())
}

async fn dispatch(command: &str, args: VecDeque<String>) -> anyhow::Result<()> {
    match command {
        "run" => {
            let Some(options) = parse_options(args, true)? else {
                return Ok(());
            };
            let config = load_config(&options)?;
            let report = runner::run(&config).await?;
            print_json(&report, options.compact)?;

            if options.fail_on_revert {
                if let Some(reason) = report.outcome.revert_reason() {
                    anyhow::bail!("purchase reverted: {reason}");
                }
            }
            Ok(())
        }
        "status" => {
            let Some(options) = parse_options(args, false)? else {
                return Ok(());
            };
            let config = load_config(&options)?;
            let report = runner::status(&config).await?;
            print_json(&report, options.compact)
        }
        "typed-data" => {
            let Some(options) = parse_options(args, false)? else {
                return Ok(());
            };
            let config = load_config(&options)?;
            let payload = runner::typed_data(&config);
            payload.ensure_schema()?;
            print_json(&payload.to_json(), options.compact)
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    let result = dispatch(&command, args).await;
    shutdown_telemetry();
    result
}
