use crate::server;
use at_voucher::config::AppConfig;
use at_voucher::error::AppError;
use at_voucher::workflows::applications::IncomeThreshold;
use at_voucher::workflows::inbound::WebhookVerifier;
use at_voucher::workflows::money::{format_cents, parse_dollars};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "AT Voucher Service",
    about = "Run and operate the assistive-technology voucher administration service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Check a household's income against the program threshold
    Eligibility(EligibilityArgs),
    /// Print the webhook signature header value for a payload file
    SignWebhook(SignWebhookArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Do not run the voucher sweep and monthly invoicing in this process
    #[arg(long)]
    pub(crate) no_jobs: bool,
}

#[derive(Args, Debug)]
pub(crate) struct EligibilityArgs {
    /// Number of people in the household
    #[arg(long)]
    household_size: u32,
    /// Annual household income, e.g. "$42,500"
    #[arg(long, value_parser = parse_dollars)]
    annual_income: u64,
}

#[derive(Args, Debug)]
pub(crate) struct SignWebhookArgs {
    /// File holding the exact request body
    payload: PathBuf,
    /// Shared secret; defaults to WEBHOOK_SECRET
    #[arg(long, env = "WEBHOOK_SECRET")]
    secret: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Eligibility(args) => run_eligibility(args),
        Command::SignWebhook(args) => run_sign_webhook(args),
    }
}

fn run_eligibility(args: EligibilityArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let threshold = IncomeThreshold::from_config(&config.program);
    let check = threshold.check(args.household_size.max(1), args.annual_income);
    println!(
        "Household of {}: income {} against a limit of {} -> {}",
        check.household_size,
        format_cents(check.annual_income_cents),
        format_cents(check.threshold_cents),
        if check.eligible { "eligible" } else { "over the limit" }
    );
    Ok(())
}

fn run_sign_webhook(args: SignWebhookArgs) -> Result<(), AppError> {
    let body = std::fs::read(&args.payload)?;
    println!("{}", WebhookVerifier::new(args.secret).sign(&body));
    Ok(())
}
