//! Logo download

use std::{
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use human_bytes::human_bytes;
use reqwest::{
    Url,
    header::{self, HeaderMap, HeaderValue},
};

use crate::{
    http::HttpClient,
    logo::{self, DownloadedLogo, Format, ImageCandidate},
};

/// Maximum size of a single downloaded logo
const MAX_LOGO_SIZE: u64 = 20 * 1024 * 1024;

/// Total timeout for a single logo download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Error for a single candidate, never fatal
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    /// Network error or error HTTP status
    #[error("Failed to fetch {url}: {reason}")]
    Fetch {
        /// Candidate URL
        url: Url,
        /// Error description
        reason: String,
    },
    /// Content is not of the expected format
    #[error("Content of {url} is {}, expected {expected}", describe_format(.found.as_ref()))]
    Validation {
        /// Candidate URL
        url: Url,
        /// Requested format
        expected: Format,
        /// Detected format
        found: Option<Format>,
    },
    /// Content has the right signature, but can not be decoded
    #[error("Content of {url} is corrupt: {reason}")]
    Corrupt {
        /// Candidate URL
        url: Url,
        /// Decoding error
        reason: String,
    },
    /// Content is identical to an already downloaded logo
    #[error("Content of {url} is identical to {of:?}")]
    Duplicate {
        /// Candidate URL
        url: Url,
        /// Already downloaded file
        of: PathBuf,
    },
    /// Failed to write file
    #[error("Failed to write logo to {path:?}: {err}")]
    Io {
        /// File or directory being written
        path: PathBuf,
        /// Error
        #[source]
        err: io::Error,
    },
}

fn describe_format(format: Option<&Format>) -> String {
    format.map_or_else(|| "not a known image format".to_owned(), ToString::to_string)
}

/// Result of downloading candidates for a company and format
#[derive(Debug, Default)]
pub(crate) struct DownloadOutcome {
    /// Successfully saved logos
    pub logos: Vec<DownloadedLogo>,
    /// Skipped candidates
    pub errors: Vec<DownloadError>,
}

/// What we learn about a logo from its content
#[derive(Debug, Eq, PartialEq)]
struct Inspection {
    size_px: Option<(u32, u32)>,
    is_transparent: Option<bool>,
}

/// Check content matches the expected format, and decode it if it is a raster image
fn inspect(data: &[u8], expected: Format, url: &Url) -> Result<Inspection, DownloadError> {
    let found = Format::sniff(data);
    if found != Some(expected) {
        return Err(DownloadError::Validation {
            url: url.to_owned(),
            expected,
            found,
        });
    }
    let Some(image_format) = expected.to_image_format() else {
        // vector, we can't tell without rendering
        return Ok(Inspection {
            size_px: None,
            is_transparent: None,
        });
    };
    let img = image::load_from_memory_with_format(data, image_format).map_err(|err| {
        DownloadError::Corrupt {
            url: url.to_owned(),
            reason: err.to_string(),
        }
    })?;
    let is_transparent = img.color().has_alpha()
        && img
            .to_rgba8()
            .pixels()
            .any(|&image::Rgba([_, _, _, a])| a < u8::MAX);
    Ok(Inspection {
        size_px: Some((img.width(), img.height())),
        is_transparent: Some(is_transparent),
    })
}

/// Write data to `<dir>/<slug>_<index>.<ext>`, using the first index from `next_index` that does not
/// exist yet. Existing files are never overwritten.
fn save_unique(
    dir: &Path,
    slug: &str,
    ext: &str,
    data: &[u8],
    next_index: &mut usize,
) -> io::Result<PathBuf> {
    let mut tmp_file = tempfile::NamedTempFile::new_in(dir)?;
    tmp_file.write_all(data)?;
    loop {
        let path = dir.join(format!("{slug}_{next_index}.{ext}"));
        *next_index += 1;
        match tmp_file.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                log::debug!("{path:?} already exists");
                tmp_file = err.file;
            }
            Err(err) => return Err(err.error),
        }
    }
}

/// Logo downloader
pub(crate) struct LogoDownloader {
    /// HTTP client
    http: HttpClient,
}

impl LogoDownloader {
    pub(crate) fn new() -> anyhow::Result<Self> {
        let headers: HeaderMap = [(
            header::ACCEPT,
            HeaderValue::from_static("image/svg+xml,image/*;q=0.9,*/*;q=0.5"),
        )]
        .into_iter()
        .collect();
        let http = HttpClient::new(DOWNLOAD_TIMEOUT, headers, None)
            .context("Failed to initialize download HTTP client")?;
        Ok(Self { http })
    }

    /// Download candidates in rank order until `max_count` valid and distinct logos are saved
    pub(crate) async fn download(
        &self,
        company: &str,
        format: Format,
        candidates: &[ImageCandidate],
        output_dir: &Path,
        max_count: usize,
    ) -> DownloadOutcome {
        let mut outcome = DownloadOutcome::default();

        let dir = logo::format_dir(output_dir, format);
        if let Err(err) = fs::create_dir_all(&dir) {
            outcome.errors.push(DownloadError::Io { path: dir, err });
            return outcome;
        }
        let slug = logo::company_slug(company);
        let mut next_index = 1;

        for candidate in candidates {
            if outcome.logos.len() >= max_count {
                break;
            }
            log::debug!("Trying {candidate} {:?}", candidate.title);
            match self
                .download_one(
                    company,
                    format,
                    candidate,
                    &dir,
                    &slug,
                    &mut next_index,
                    &outcome.logos,
                )
                .await
            {
                Ok(logo) => {
                    #[expect(clippy::cast_precision_loss)]
                    let size = human_bytes(logo.byte_size as f64);
                    log::info!("Saved {format} logo {:?} ({size})", logo.path);
                    outcome.logos.push(logo);
                }
                Err(err) => {
                    log::warn!("{err}");
                    outcome.errors.push(err);
                }
            }
        }

        outcome
    }

    /// Download, validate and save a single candidate
    #[expect(clippy::too_many_arguments)]
    async fn download_one(
        &self,
        company: &str,
        format: Format,
        candidate: &ImageCandidate,
        dir: &Path,
        slug: &str,
        next_index: &mut usize,
        previous: &[DownloadedLogo],
    ) -> Result<DownloadedLogo, DownloadError> {
        let url = &candidate.url;
        let mut data = Vec::new();
        let byte_size = self
            .http
            .download(url.clone(), &mut data, MAX_LOGO_SIZE)
            .await
            .map_err(|err| DownloadError::Fetch {
                url: url.to_owned(),
                reason: err.to_string(),
            })?;

        let hash = blake3::hash(&data);
        if let Some(previous) = previous.iter().find(|l| l.hash == hash) {
            return Err(DownloadError::Duplicate {
                url: url.to_owned(),
                of: previous.path.clone(),
            });
        }

        let inspect_url = url.to_owned();
        let (data, inspection) = tokio::task::spawn_blocking(move || {
            let inspection = inspect(&data, format, &inspect_url);
            (data, inspection)
        })
        .await
        .map_err(|err| DownloadError::Corrupt {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;
        let inspection = inspection?;

        let path = save_unique(dir, slug, format.extension(), &data, next_index).map_err(|err| {
            DownloadError::Io {
                path: dir.to_owned(),
                err,
            }
        })?;

        Ok(DownloadedLogo {
            company: company.to_owned(),
            format,
            path,
            byte_size,
            is_transparent: inspection.is_transparent,
            size_px: inspection.size_px,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;
    use crate::logo::{
        Metadata,
        tests::{png_bytes, raster_bytes, svg_bytes},
    };

    async fn serve(server: &MockServer, url_path: &str, status: u16, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
            .mount(server)
            .await;
    }

    fn candidate(server: &MockServer, url_path: &str, format: Format, rank: usize) -> ImageCandidate {
        ImageCandidate {
            url: format!("{}{url_path}", server.uri()).parse().unwrap(),
            format: Metadata::known(format),
            size_px: None,
            rank,
            title: String::new(),
        }
    }

    #[tokio::test]
    async fn stops_at_max_count() {
        let _ = simple_logger::init_with_env();
        let server = MockServer::start().await;
        serve(&server, "/1.png", 200, png_bytes(10, 10, true)).await;
        serve(&server, "/2.png", 200, png_bytes(20, 10, false)).await;
        serve(&server, "/3.png", 200, png_bytes(30, 10, false)).await;
        let candidates: Vec<_> = ["/1.png", "/2.png", "/3.png"]
            .iter()
            .enumerate()
            .map(|(i, p)| candidate(&server, p, Format::Png, i))
            .collect();
        let output_dir = tempfile::tempdir().unwrap();

        let outcome = LogoDownloader::new()
            .unwrap()
            .download("Acme", Format::Png, &candidates, output_dir.path(), 2)
            .await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.logos.len(), 2);
        let png_dir = output_dir.path().join("png");
        assert_eq!(outcome.logos[0].path, png_dir.join("acme_1.png"));
        assert_eq!(outcome.logos[1].path, png_dir.join("acme_2.png"));
        assert_eq!(outcome.logos[0].is_transparent, Some(true));
        assert_eq!(outcome.logos[1].is_transparent, Some(false));
        assert_eq!(outcome.logos[1].size_px, Some((20, 10)));
        assert!(!png_dir.join("acme_3.png").exists());
        assert_eq!(fs::read_dir(&png_dir).unwrap().count(), 2);
        assert_eq!(
            fs::metadata(&outcome.logos[0].path).unwrap().len(),
            outcome.logos[0].byte_size
        );
    }

    #[tokio::test]
    async fn skips_failures_and_duplicates() {
        let server = MockServer::start().await;
        let logo_data = png_bytes(10, 10, false);
        serve(&server, "/missing.png", 404, Vec::new()).await;
        serve(&server, "/a.png", 200, logo_data.clone()).await;
        serve(&server, "/a_copy.png", 200, logo_data).await;
        serve(&server, "/page.png", 200, b"<html>hello</html>".to_vec()).await;
        serve(&server, "/actually.png", 200, raster_bytes(5, 5, false, Format::Jpeg)).await;
        serve(&server, "/b.png", 200, png_bytes(12, 10, false)).await;
        let candidates: Vec<_> = [
            "/missing.png",
            "/a.png",
            "/a_copy.png",
            "/page.png",
            "/actually.png",
            "/b.png",
        ]
        .iter()
        .enumerate()
        .map(|(i, p)| candidate(&server, p, Format::Png, i))
        .collect();
        let output_dir = tempfile::tempdir().unwrap();

        let outcome = LogoDownloader::new()
            .unwrap()
            .download("Acme", Format::Png, &candidates, output_dir.path(), 5)
            .await;

        assert_eq!(outcome.logos.len(), 2);
        assert_eq!(outcome.errors.len(), 4);
        assert!(matches!(outcome.errors[0], DownloadError::Fetch { .. }));
        assert!(matches!(outcome.errors[1], DownloadError::Duplicate { .. }));
        assert!(matches!(
            outcome.errors[2],
            DownloadError::Validation { found: None, .. }
        ));
        assert!(matches!(
            outcome.errors[3],
            DownloadError::Validation {
                found: Some(Format::Jpeg),
                ..
            }
        ));
        let png_dir = output_dir.path().join("png");
        assert_eq!(outcome.logos[1].path, png_dir.join("acme_2.png"));
    }

    #[tokio::test]
    async fn html_page_is_not_svg() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/logo.svg",
            200,
            b"<!DOCTYPE html><html><head><title>Acme</title></head>\
              <body><svg width=\"10\" height=\"10\"></svg><p>Buy now</p></body></html>"
                .to_vec(),
        )
        .await;
        serve(&server, "/real.svg", 200, svg_bytes(100, 50)).await;
        let output_dir = tempfile::tempdir().unwrap();

        let outcome = LogoDownloader::new()
            .unwrap()
            .download(
                "Acme",
                Format::Svg,
                &[
                    candidate(&server, "/logo.svg", Format::Svg, 0),
                    candidate(&server, "/real.svg", Format::Svg, 1),
                ],
                output_dir.path(),
                1,
            )
            .await;

        assert!(matches!(
            outcome.errors.as_slice(),
            [DownloadError::Validation {
                expected: Format::Svg,
                found: None,
                ..
            }]
        ));
        assert_eq!(outcome.logos.len(), 1);
        assert_eq!(
            fs::read(&outcome.logos[0].path).unwrap(),
            svg_bytes(100, 50)
        );
    }

    #[tokio::test]
    async fn truncated_image_is_corrupt() {
        let server = MockServer::start().await;
        let mut data = png_bytes(50, 50, false);
        data.truncate(40);
        serve(&server, "/cut.png", 200, data).await;
        let output_dir = tempfile::tempdir().unwrap();

        let outcome = LogoDownloader::new()
            .unwrap()
            .download(
                "Acme",
                Format::Png,
                &[candidate(&server, "/cut.png", Format::Png, 0)],
                output_dir.path(),
                1,
            )
            .await;

        assert!(outcome.logos.is_empty());
        assert!(matches!(outcome.errors[0], DownloadError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn never_overwrites() {
        let server = MockServer::start().await;
        serve(&server, "/logo.svg", 200, svg_bytes(100, 50)).await;
        let output_dir = tempfile::tempdir().unwrap();
        let svg_dir = output_dir.path().join("svg");
        fs::create_dir_all(&svg_dir).unwrap();
        fs::write(svg_dir.join("acme_corp_1.svg"), b"previous run").unwrap();

        let outcome = LogoDownloader::new()
            .unwrap()
            .download(
                "Acme Corp",
                Format::Svg,
                &[candidate(&server, "/logo.svg", Format::Svg, 0)],
                output_dir.path(),
                1,
            )
            .await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.logos[0].path, svg_dir.join("acme_corp_2.svg"));
        assert_eq!(outcome.logos[0].is_transparent, None);
        assert_eq!(
            fs::read(svg_dir.join("acme_corp_1.svg")).unwrap(),
            b"previous run"
        );
    }

    #[test]
    fn inspect_transparency() {
        let url: Url = "https://example.com/x".parse().unwrap();
        assert_eq!(
            inspect(&png_bytes(3, 2, true), Format::Png, &url).unwrap(),
            Inspection {
                size_px: Some((3, 2)),
                is_transparent: Some(true)
            }
        );
        assert_eq!(
            inspect(&raster_bytes(3, 2, false, Format::Jpeg), Format::Jpeg, &url).unwrap(),
            Inspection {
                size_px: Some((3, 2)),
                is_transparent: Some(false)
            }
        );
        assert!(inspect(b"", Format::Png, &url).is_err());
    }
}
