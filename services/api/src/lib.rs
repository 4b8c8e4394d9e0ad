mod cli;
mod infra;
mod jobs;
mod routes;
mod server;

use at_voucher::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
