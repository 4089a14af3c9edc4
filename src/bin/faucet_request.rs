use anyhow::{Context, Result, bail};
use clap::Parser;
use sepolia_faucet::address::{parse_recipient, parse_tx_hash};
use sepolia_faucet::client::FaucetClient;
use sepolia_faucet::config::FaucetConfig;
use sepolia_faucet::init_tracing;
use sepolia_faucet::poller::{PollOutcome, StatusPoller, TransactionStatus};
use tracing::info;

/// Request Sepolia ether from a faucet server and wait for it to be mined.
#[derive(Parser, Debug)]
#[command(name = "faucet-request", version)]
struct Args {
    /// Recipient account, 0x followed by 40 hex digits.
    address: String,

    #[arg(long, env = "FAUCET_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server: String,

    #[arg(long, env = "FAUCET_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Status checks before giving up. Defaults to `poll.max_attempts`.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Pause between status checks. Defaults to `poll.interval_ms`.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Return right after the transfer is submitted.
    #[arg(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    if let Err(err) = parse_recipient(&args.address) {
        bail!("Invalid Ethereum address format: {err}");
    }
    let config = FaucetConfig::load().context("Failed to load configuration")?;
    let settings = config
        .poll
        .with_overrides(args.max_attempts, args.interval_ms)?;
    let password = args
        .password
        .clone()
        .or_else(|| config.access.password.map(|password| password.expose().to_string()));

    let client = FaucetClient::new(&args.server, password)?;
    let submitted = client
        .request_funds(&args.address)
        .await
        .context("Faucet request failed")?;
    println!("{}", submitted.message);
    println!("Transaction hash: {}", submitted.hash);
    if let Some(next) = submitted.next_eligible_at {
        println!("Next request allowed after {}", next.to_rfc3339());
    }

    if args.no_wait {
        return Ok(());
    }

    let hash = parse_tx_hash(&submitted.hash).context("Faucet returned a malformed hash")?;
    info!(
        "Waiting for confirmation ({} checks, {:?} apart)",
        settings.max_attempts(),
        settings.interval()
    );

    let outcome = StatusPoller::new(client, settings)
        .wait_for_confirmation(hash)
        .await
        .context("Status check rejected by faucet")?;

    match outcome {
        PollOutcome::Confirmed { block_number, .. } => {
            println!("Transaction successfully mined in block {block_number}");
        }
        PollOutcome::GaveUp {
            attempts,
            last_status,
        } => {
            let detail = match last_status {
                TransactionStatus::Unknown { reason } => format!(" (last check: {reason})"),
                _ => String::new(),
            };
            println!(
                "Transaction status unknown after {attempts} checks{detail}; it may still be pending. Look up {} on a Sepolia explorer.",
                submitted.hash
            );
        }
    }
    Ok(())
}
