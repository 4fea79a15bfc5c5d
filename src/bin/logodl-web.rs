//! Copy carousel logos to a directory, with website friendly file names

use anyhow::Context as _;
use clap::Parser as _;
use logodl::{cl, export_logos};

fn main() -> anyhow::Result<()> {
    // Parse CL args
    let cl_args = cl::WebArgs::parse();

    // Init logger
    simple_logger::init_with_level(cl_args.verbosity).context("Failed to setup logger")?;

    // Run
    let report = export_logos(
        &cl_args.input_dir,
        &cl_args.output_dir,
        cl_args.company.as_slice(),
    )?;

    println!("{report}");
    Ok(())
}
