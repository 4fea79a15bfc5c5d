//! Internal API exposed for the `logodl` binaries

use std::{num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools as _;

pub use crate::{
    config::{ConfigError, ConfigLocation, Credentials, resolve_credentials},
    download::DownloadError,
    logo::{CarouselBox, CarouselVariant, DownloadedLogo, Format, VariantKind},
    normalize::ResizeError,
    report::{AcquisitionResult, ItemError, RunReport, RunStatus},
    search::SearchApiError,
    web::{ExportError, ExportReport, export_logos},
};
use crate::{
    download::LogoDownloader,
    normalize::{ImageNormalizer, ResizeStrategy},
    search::{GoogleCustomSearch, LogoSearch, SearchQuery},
};

pub mod cl;
mod config;
mod download;
mod http;
mod logo;
mod normalize;
mod report;
mod search;
mod web;

/// What to acquire for each company
#[derive(Debug, Clone)]
pub struct AcquisitionOptions {
    /// Formats to search, in processing order
    pub formats: Vec<Format>,
    /// Maximum logos to download per company and format
    pub num_per_format: NonZeroUsize,
    /// Carousel bounding box
    pub carousel: CarouselBox,
    /// Do not produce carousel variants
    pub skip_resize: bool,
    /// Root output directory
    pub output_dir: PathBuf,
}

/// Processing state of a company and format pair
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum PairState {
    Pending,
    Searching,
    Downloading,
    Resizing,
    Done,
    Complete,
    Failed,
}

impl PairState {
    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Searching)
                | (Self::Searching | Self::Downloading, Self::Failed)
                | (Self::Searching, Self::Downloading)
                | (Self::Downloading, Self::Resizing | Self::Done)
                | (Self::Resizing | Self::Done, Self::Complete)
        )
    }
}

/// A company and format being processed
struct Pair<'a> {
    company: &'a str,
    format: Format,
    state: PairState,
}

impl<'a> Pair<'a> {
    fn new(company: &'a str, format: Format) -> Self {
        Self {
            company,
            format,
            state: PairState::Pending,
        }
    }

    fn transition(&mut self, next: PairState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "Invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        log::trace!(
            "{:?}/{}: {:?} -> {:?}",
            self.company,
            self.format,
            self.state,
            next
        );
        self.state = next;
    }
}

/// Search, download and resize logos for companies
pub(crate) struct Pipeline {
    search: Box<dyn LogoSearch>,
    downloader: LogoDownloader,
    normalizer: Option<Arc<ImageNormalizer>>,
    options: AcquisitionOptions,
}

impl Pipeline {
    pub(crate) fn new(
        search: Box<dyn LogoSearch>,
        options: AcquisitionOptions,
        strategy: ResizeStrategy,
    ) -> anyhow::Result<Self> {
        let normalizer = if options.skip_resize {
            None
        } else {
            log::debug!("Vector logo strategy: {strategy:?}");
            Some(Arc::new(ImageNormalizer::new(strategy, &options.output_dir)))
        };
        Ok(Self {
            search,
            downloader: LogoDownloader::new()?,
            normalizer,
            options,
        })
    }

    /// Process all companies and formats, until done or a fatal error occurs
    pub(crate) async fn run(&self, companies: &[String]) -> RunReport {
        let mut report = RunReport::default();
        let progress_bar = Self::progress_bar(companies.len() * self.options.formats.len());

        for company in companies {
            progress_bar.set_message(company.clone());
            let mut result = AcquisitionResult::new(company, &self.options.formats);
            for format in self.options.formats.iter().copied() {
                if let Err(err) = self.process_pair(company, format, &mut result).await {
                    log::error!("{err}, aborting");
                    report.results.push(result);
                    report.fatal = Some(err);
                    progress_bar.abandon();
                    return report;
                }
                progress_bar.inc(1);
            }
            log::info!(
                "{:?}: {} logo(s) downloaded, {} error(s)",
                company,
                result.downloaded(),
                result.errors.len()
            );
            report.results.push(result);
        }

        progress_bar.finish_and_clear();
        report
    }

    fn progress_bar(len: usize) -> ProgressBar {
        let progress_bar = ProgressBar::new(len.try_into().unwrap_or(u64::MAX));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] [{bar}] {pos}/{len} {wide_msg}")
        {
            progress_bar.set_style(style);
        }
        progress_bar.enable_steady_tick(Duration::from_millis(300));
        progress_bar
    }

    /// Search, download and resize logos of a format for a company.
    /// Only fatal errors are returned, others are recorded in result.
    async fn process_pair(
        &self,
        company: &str,
        format: Format,
        result: &mut AcquisitionResult,
    ) -> Result<(), SearchApiError> {
        let mut pair = Pair::new(company, format);
        let num = self.options.num_per_format.get();

        // Search
        pair.transition(PairState::Searching);
        let query = SearchQuery::new(company, format);
        let candidates = match self.search.search(&query, num.saturating_mul(2)).await {
            Ok(candidates) => candidates,
            Err(err) if err.is_fatal() => {
                pair.transition(PairState::Failed);
                return Err(err);
            }
            Err(err) => {
                log::warn!("Search failed for {company:?} {format} logos: {err}");
                pair.transition(PairState::Failed);
                result.record_error(format, err);
                return Ok(());
            }
        };
        log::debug!(
            "{} candidate(s) for {company:?} {format} logos:\n{}",
            candidates.len(),
            candidates.iter().join("\n")
        );

        // Download
        pair.transition(PairState::Downloading);
        let outcome = self
            .downloader
            .download(company, format, &candidates, &self.options.output_dir, num)
            .await;
        let logos = outcome.logos.clone();
        result.record_downloads(format, outcome);

        // Resize
        match &self.normalizer {
            Some(normalizer) => {
                pair.transition(PairState::Resizing);
                let target = self.options.carousel;
                for logo in logos {
                    let normalizer = Arc::clone(normalizer);
                    let src = logo.path.clone();
                    let task = tokio::task::spawn_blocking(move || normalizer.resize(&logo, target));
                    match flatten_resize_task(src, task.await) {
                        Ok(variant) => result.record_variant(format, variant),
                        Err(err) => {
                            log::warn!("{err}");
                            result.record_error(format, err);
                        }
                    }
                }
            }
            None => pair.transition(PairState::Done),
        }

        pair.transition(PairState::Complete);
        Ok(())
    }
}

/// Turn a resize task failure into an error for the logo it was processing
fn flatten_resize_task(
    src: PathBuf,
    res: Result<Result<CarouselVariant, ResizeError>, tokio::task::JoinError>,
) -> Result<CarouselVariant, ResizeError> {
    res.unwrap_or_else(|err| {
        Err(ResizeError::Render {
            path: src,
            reason: format!("resize task failed: {err}"),
        })
    })
}

/// Search, download and optionally resize logos for all companies using the Google Custom Search API
pub async fn acquire_logos(
    companies: &[String],
    options: AcquisitionOptions,
    credentials: Credentials,
) -> anyhow::Result<RunReport> {
    let search =
        GoogleCustomSearch::new(credentials).context("Failed to initialize search client")?;
    let pipeline = Pipeline::new(Box::new(search), options, ResizeStrategy::detect())?;
    Ok(pipeline.run(companies).await)
}
