//! Run results and summary

use std::{
    collections::BTreeMap,
    fmt,
    process::{ExitCode, Termination},
};

use crate::{
    download::{DownloadError, DownloadOutcome},
    logo::{CarouselVariant, DownloadedLogo, Format},
    normalize::ResizeError,
    search::SearchApiError,
};

/// Error for a single item of a company, that did not stop the run
#[derive(thiserror::Error, Debug)]
pub enum ItemError {
    /// Search query failed
    #[error(transparent)]
    Search(#[from] SearchApiError),
    /// Candidate download was skipped
    #[error(transparent)]
    Download(#[from] DownloadError),
    /// Carousel variant could not be produced
    #[error(transparent)]
    Resize(#[from] ResizeError),
}

/// Result of processing all formats for a company
#[derive(Debug)]
pub struct AcquisitionResult {
    /// Company name
    pub company: String,
    /// Downloaded logo count for each requested format
    pub per_format_counts: BTreeMap<Format, usize>,
    /// Carousel variant count for each requested format
    pub carousel_counts: BTreeMap<Format, usize>,
    /// Downloaded logos
    pub logos: Vec<DownloadedLogo>,
    /// Carousel variants
    pub variants: Vec<CarouselVariant>,
    /// Errors in the order they occurred
    pub errors: Vec<(Format, ItemError)>,
}

impl AcquisitionResult {
    pub(crate) fn new(company: &str, formats: &[Format]) -> Self {
        Self {
            company: company.to_owned(),
            per_format_counts: formats.iter().map(|f| (*f, 0)).collect(),
            carousel_counts: formats.iter().map(|f| (*f, 0)).collect(),
            logos: Vec::new(),
            variants: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Total downloaded logos across formats
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.per_format_counts.values().sum()
    }

    pub(crate) fn record_error<E: Into<ItemError>>(&mut self, format: Format, err: E) {
        self.errors.push((format, err.into()));
    }

    pub(crate) fn record_downloads(&mut self, format: Format, outcome: DownloadOutcome) {
        *self.per_format_counts.entry(format).or_default() += outcome.logos.len();
        self.logos.extend(outcome.logos);
        for err in outcome.errors {
            self.record_error(format, err);
        }
    }

    pub(crate) fn record_variant(&mut self, format: Format, variant: CarouselVariant) {
        *self.carousel_counts.entry(format).or_default() += 1;
        self.variants.push(variant);
    }
}

impl fmt::Display for AcquisitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.company)?;
        for (format, count) in &self.per_format_counts {
            let carousel = self.carousel_counts.get(format).copied().unwrap_or_default();
            write!(f, " {format} {count} (carousel {carousel})")?;
        }
        write!(f, ", {} error(s)", self.errors.len())?;
        for (format, err) in &self.errors {
            write!(f, "\n  [{format}] {err}")?;
        }
        Ok(())
    }
}

/// Result of a whole run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Results of companies processed, in input order
    pub results: Vec<AcquisitionResult>,
    /// Error that stopped the run, if any
    pub fatal: Option<SearchApiError>,
}

impl RunReport {
    /// Exit status for this run
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.fatal.is_some() {
            RunStatus::Aborted
        } else if self.results.iter().all(|r| r.downloaded() == 0) {
            RunStatus::NothingDownloaded
        } else {
            RunStatus::Completed
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for result in &self.results {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{result}")?;
        }
        if let Some(fatal) = &self.fatal {
            if !first {
                writeln!(f)?;
            }
            write!(f, "Run aborted: {fatal}")?;
        }
        Ok(())
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RunStatus {
    /// All companies were processed and some logos were downloaded, possibly with errors
    Completed,
    /// All companies were processed, but no logo was downloaded
    NothingDownloaded,
    /// A fatal search API error stopped the run
    Aborted,
}

impl Termination for RunStatus {
    fn report(self) -> ExitCode {
        match self {
            RunStatus::Completed => ExitCode::SUCCESS,
            RunStatus::NothingDownloaded => ExitCode::FAILURE,
            RunStatus::Aborted => ExitCode::from(2),
        }
    }
}
