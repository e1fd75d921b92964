use crate::infra::{parse_date, seed_store};
use chrono::NaiveDate;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stay_search::config::SearchConfig;
use stay_search::error::AppError;
use stay_search::search::{SearchRequest, SearchResponse, StayRange, StaySearchService};

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// JSON fixture holding units, availability blocks and price periods
    #[arg(long)]
    pub(crate) fixture: PathBuf,
    /// Search request JSON file, or `-` to read it from stdin
    #[arg(long)]
    pub(crate) request: PathBuf,
    /// Override the request's check-in date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, requires = "check_out")]
    pub(crate) check_in: Option<NaiveDate>,
    /// Override the request's check-out date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, requires = "check_in")]
    pub(crate) check_out: Option<NaiveDate>,
}

pub(crate) async fn run_search(args: SearchArgs) -> Result<(), AppError> {
    let response = execute_search(&args, SearchConfig::from_env()?).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub(crate) async fn execute_search(
    args: &SearchArgs,
    config: SearchConfig,
) -> Result<SearchResponse, AppError> {
    let store = seed_store(Some(&args.fixture)).await?;
    let service = StaySearchService::new(Arc::new(store), &config);

    let mut request = read_request(&args.request)?;
    if let (Some(check_in), Some(check_out)) = (args.check_in, args.check_out) {
        request.stay = Some(StayRange {
            check_in,
            check_out,
        });
    }

    Ok(service.search(request).await?)
}

fn read_request(path: &Path) -> Result<SearchRequest, AppError> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}
