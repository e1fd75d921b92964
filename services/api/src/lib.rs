mod cli;
mod infra;
mod routes;
mod search;
mod server;

use stay_search::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
