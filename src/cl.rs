//! Command line interface

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
};

use clap::Parser;

use crate::{AcquisitionOptions, CarouselBox, Format};

/// Command line arguments for `logodl` binary
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct LogoArgs {
    /// Company names to search logos for
    #[clap(required = true)]
    pub companies: Vec<String>,
    /// Logo formats to search, in order
    #[clap(short, long, num_args = 1.., default_values_t = [Format::Svg, Format::Png])]
    pub formats: Vec<Format>,
    /// Maximum logos to download per company and format
    #[clap(short, long, default_value = "5")]
    pub num_per_format: NonZeroUsize,
    /// Carousel variant bounding box width and height
    #[clap(
        long,
        num_args = 2,
        value_names = ["WIDTH", "HEIGHT"],
        default_values = ["200", "100"]
    )]
    pub carousel_size: Vec<NonZeroU32>,
    /// Do not produce carousel variants
    #[clap(long)]
    pub skip_resize: bool,
    /// Output directory
    #[clap(short, long, default_value = "data/logos")]
    pub output_dir: PathBuf,
    /// JSON credentials file, used for values not set in environment.
    /// Defaults to a file in the user config directory.
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Level of logging output
    #[clap(short, long, default_value_t = log::Level::Info)]
    pub verbosity: log::Level,
}

/// Command line arguments for `logodl-web` binary
#[derive(Parser, Debug)]
#[command(version, about = "Copy carousel logos to website friendly file names")]
pub struct WebArgs {
    /// Directory containing carousel variants
    #[clap(short, long, default_value = "data/logos/carousel")]
    pub input_dir: PathBuf,
    /// Directory to copy renamed logos to
    #[clap(short, long, default_value = "data/logos_for_website")]
    pub output_dir: PathBuf,
    /// Only export logos of these companies
    #[clap(short, long, num_args = 1..)]
    pub company: Vec<String>,
    /// Level of logging output
    #[clap(short, long, default_value_t = log::Level::Info)]
    pub verbosity: log::Level,
}

impl LogoArgs {
    /// Acquisition options from arguments, with duplicate formats removed
    #[must_use]
    pub fn acquisition_options(&self) -> AcquisitionOptions {
        let mut formats = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }
        // last occurrence wins if the option is repeated
        let carousel = match self.carousel_size.last_chunk::<2>() {
            Some(&[width, height]) => CarouselBox { width, height },
            None => unreachable!("clap enforces two values"),
        };
        AcquisitionOptions {
            formats,
            num_per_format: self.num_per_format,
            carousel,
            skip_resize: self.skip_resize,
            output_dir: self.output_dir.clone(),
        }
    }
}
