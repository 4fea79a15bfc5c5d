//! logodl main binary

use anyhow::Context as _;
use clap::Parser as _;
use logodl::{ConfigLocation, RunStatus, acquire_logos, cl, resolve_credentials};

#[tokio::main]
async fn main() -> anyhow::Result<RunStatus> {
    // Parse CL args
    let cl_args = cl::LogoArgs::parse();

    // Init logger
    simple_logger::init_with_level(cl_args.verbosity).context("Failed to setup logger")?;

    // Resolve credentials before any network call
    let config = ConfigLocation::new(cl_args.config.clone());
    let credentials = resolve_credentials(&config, |name| std::env::var(name).ok())?;
    log::debug!("Using {credentials:?}");

    // Run
    let report = acquire_logos(
        &cl_args.companies,
        cl_args.acquisition_options(),
        credentials,
    )
    .await?;

    println!("{report}");
    Ok(report.status())
}
