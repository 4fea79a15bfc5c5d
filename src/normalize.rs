//! Carousel variant generation

use std::{
    cmp, fs, io,
    path::{Path, PathBuf},
};

use strum::VariantArray as _;
use typed_floats::PositiveFinite;

use crate::logo::{self, CarouselBox, CarouselVariant, DownloadedLogo, Format, VariantKind};

/// Error for a single logo, never fatal
#[derive(thiserror::Error, Debug)]
pub enum ResizeError {
    /// Content is not an image format we can handle
    #[error("Unsupported image format for {path:?}")]
    UnsupportedFormat {
        /// Logo file
        path: PathBuf,
    },
    /// Content can not be decoded
    #[error("Failed to decode {path:?}: {reason}")]
    Corrupt {
        /// Logo file
        path: PathBuf,
        /// Decoding error
        reason: String,
    },
    /// Variant could not be rendered or encoded
    #[error("Failed to render variant of {path:?}: {reason}")]
    Render {
        /// Logo file
        path: PathBuf,
        /// Error description
        reason: String,
    },
    /// File read or write failed
    #[error("I/O error for {path:?}: {err}")]
    Io {
        /// File being read or written
        path: PathBuf,
        /// Error
        #[source]
        err: io::Error,
    },
}

/// How vector images are handled
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResizeStrategy {
    /// Render vector images to PNG at carousel size
    #[cfg(feature = "svg")]
    RasterizeAndResize,
    /// Vector rendering is not available, copy them as is
    CopyUnresized,
}

impl ResizeStrategy {
    /// Pick best strategy available in this build
    pub(crate) fn detect() -> Self {
        #[cfg(feature = "svg")]
        {
            Self::RasterizeAndResize
        }
        #[cfg(not(feature = "svg"))]
        {
            Self::CopyUnresized
        }
    }
}

/// Compute size fitting in target box, preserving aspect ratio.
/// Unless `allow_upscale` is set, sizes already fitting are returned unchanged.
/// Return None for empty or invalid source sizes.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn fit_size(
    src_width: f64,
    src_height: f64,
    target: CarouselBox,
    allow_upscale: bool,
) -> Option<(u32, u32)> {
    let target_width = f64::from(target.width.get());
    let target_height = f64::from(target.height.get());
    let scale_w = PositiveFinite::<f64>::try_from(target_width / src_width).ok()?;
    let scale_h = PositiveFinite::<f64>::try_from(target_height / src_height).ok()?;
    let scale = cmp::min(scale_w, scale_h).get();
    if (scale >= 1.0) && !allow_upscale {
        return Some((src_width.round() as u32, src_height.round() as u32));
    }
    let width = (src_width * scale).round().clamp(1.0, target_width) as u32;
    let height = (src_height * scale).round().clamp(1.0, target_height) as u32;
    Some((width, height))
}

/// Produces carousel variants of downloaded logos
pub(crate) struct ImageNormalizer {
    /// Vector image handling
    strategy: ResizeStrategy,
    /// Root output directory
    output_dir: PathBuf,
}

impl ImageNormalizer {
    pub(crate) fn new(strategy: ResizeStrategy, output_dir: &Path) -> Self {
        Self {
            strategy,
            output_dir: output_dir.to_owned(),
        }
    }

    /// Produce carousel variant of a logo fitting in target box, replacing any previous variant of
    /// the same logo
    pub(crate) fn resize(
        &self,
        logo: &DownloadedLogo,
        target: CarouselBox,
    ) -> Result<CarouselVariant, ResizeError> {
        let src = &logo.path;
        let data = fs::read(src).map_err(|err| ResizeError::Io {
            path: src.to_owned(),
            err,
        })?;
        if data.is_empty() {
            return Err(ResizeError::Corrupt {
                path: src.to_owned(),
                reason: "empty file".to_owned(),
            });
        }
        let format = Format::sniff(&data).ok_or_else(|| ResizeError::UnsupportedFormat {
            path: src.to_owned(),
        })?;

        let dir = logo::carousel_dir(&self.output_dir, logo.format);
        fs::create_dir_all(&dir).map_err(|err| ResizeError::Io {
            path: dir.clone(),
            err,
        })?;
        let stem = src
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ResizeError::UnsupportedFormat {
                path: src.to_owned(),
            })?;

        let (path, size_px, kind) = if format.is_vector() {
            self.process_vector(src, &data, target, &dir, stem)?
        } else {
            process_raster(src, &data, format, target, &dir, stem)?
        };
        remove_stale_variants(&dir, stem, &path);

        log::info!(
            "Carousel variant {path:?} {kind}{}",
            size_px.map(|(w, h)| format!(" {w}x{h}")).unwrap_or_default()
        );
        Ok(CarouselVariant {
            source: src.to_owned(),
            target,
            size_px,
            path,
            kind,
        })
    }

    /// Handle vector image according to strategy
    #[cfg_attr(not(feature = "svg"), expect(unused_variables))]
    fn process_vector(
        &self,
        src: &Path,
        data: &[u8],
        target: CarouselBox,
        dir: &Path,
        stem: &str,
    ) -> Result<(PathBuf, Option<(u32, u32)>, VariantKind), ResizeError> {
        match self.strategy {
            #[cfg(feature = "svg")]
            ResizeStrategy::RasterizeAndResize => {
                let path = dir.join(format!("{stem}.{}", Format::Png.extension()));
                let size = rasterize_svg(src, data, target, &path)?;
                crunch_png(&path);
                Ok((path, Some(size), VariantKind::Resized))
            }
            ResizeStrategy::CopyUnresized => {
                log::debug!("No vector rendering support, copying {src:?} unresized");
                let path = dir.join(format!("{stem}.{}", Format::Svg.extension()));
                write_file(&path, data)?;
                Ok((path, None, VariantKind::Unresized))
            }
        }
    }
}

/// Downscale raster image to fit box, or copy it if it already fits
fn process_raster(
    src: &Path,
    data: &[u8],
    format: Format,
    target: CarouselBox,
    dir: &Path,
    stem: &str,
) -> Result<(PathBuf, Option<(u32, u32)>, VariantKind), ResizeError> {
    let image_format = format
        .to_image_format()
        .ok_or_else(|| ResizeError::UnsupportedFormat {
            path: src.to_owned(),
        })?;
    let img = image::load_from_memory_with_format(data, image_format).map_err(|err| {
        ResizeError::Corrupt {
            path: src.to_owned(),
            reason: err.to_string(),
        }
    })?;
    let src_size = (img.width(), img.height());
    let size = fit_size(f64::from(src_size.0), f64::from(src_size.1), target, false)
        .ok_or_else(|| ResizeError::Corrupt {
            path: src.to_owned(),
            reason: format!("invalid size {}x{}", src_size.0, src_size.1),
        })?;
    let path = dir.join(format!("{stem}.{}", format.extension()));

    if size == src_size {
        log::debug!("{src:?} already fits in {target}, copying");
        write_file(&path, data)?;
        return Ok((path, Some(size), VariantKind::Copied));
    }

    log::debug!(
        "Resizing {src:?} from {}x{} to {}x{}",
        src_size.0,
        src_size.1,
        size.0,
        size.1
    );
    let mut resized = img.resize_exact(size.0, size.1, image::imageops::FilterType::Lanczos3);
    if format == Format::Jpeg {
        resized = image::DynamicImage::ImageRgb8(resized.to_rgb8());
    }
    resized
        .save_with_format(&path, image_format)
        .map_err(|err| ResizeError::Render {
            path: src.to_owned(),
            reason: err.to_string(),
        })?;
    if format == Format::Png {
        crunch_png(&path);
    }
    Ok((path, Some(size), VariantKind::Resized))
}

/// Render SVG into a transparent PNG fitting the box
#[cfg(feature = "svg")]
fn rasterize_svg(
    src: &Path,
    data: &[u8],
    target: CarouselBox,
    dst: &Path,
) -> Result<(u32, u32), ResizeError> {
    use std::sync::{Arc, LazyLock};

    use resvg::{tiny_skia, usvg};

    static FONTS: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        Arc::new(db)
    });

    let render_err = |reason: String| ResizeError::Render {
        path: src.to_owned(),
        reason,
    };

    let options = usvg::Options {
        fontdb: Arc::clone(&FONTS),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_data(data, &options).map_err(|err| ResizeError::Corrupt {
        path: src.to_owned(),
        reason: err.to_string(),
    })?;
    let svg_size = tree.size();
    let (width, height) = fit_size(
        f64::from(svg_size.width()),
        f64::from(svg_size.height()),
        target,
        true,
    )
    .ok_or_else(|| ResizeError::Corrupt {
        path: src.to_owned(),
        reason: "invalid SVG size".to_owned(),
    })?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| render_err(format!("invalid canvas size {width}x{height}")))?;
    #[expect(clippy::cast_precision_loss)]
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / svg_size.width(),
        height as f32 / svg_size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());
    pixmap
        .save_png(dst)
        .map_err(|err| render_err(err.to_string()))?;
    Ok((width, height))
}

/// Write file, replacing previous content
fn write_file(path: &Path, data: &[u8]) -> Result<(), ResizeError> {
    fs::write(path, data).map_err(|err| ResizeError::Io {
        path: path.to_owned(),
        err,
    })
}

/// Remove variants of the same logo with another extension, left from a previous run
fn remove_stale_variants(dir: &Path, stem: &str, keep: &Path) {
    for format in Format::VARIANTS {
        let path = dir.join(format!("{stem}.{}", format.extension()));
        if path == keep {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed stale variant {path:?}"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("Failed to remove stale variant {path:?}: {err}"),
        }
    }
}

/// Losslessly optimize PNG file in place
fn crunch_png(path: &Path) {
    log::debug!("Crunching PNG file {path:?}...");
    let options = oxipng::Options::from_preset(2);
    match oxipng::optimize(
        &oxipng::InFile::Path(path.to_owned()),
        &oxipng::OutFile::from_path(path.to_owned()),
        &options,
    ) {
        #[expect(clippy::cast_precision_loss)]
        Ok((size_before, size_after)) => {
            let size_delta = size_before.checked_sub(size_after).unwrap_or_default();
            log::debug!(
                "PNG crunching saved {} bytes ({:.02}%)",
                size_delta,
                100.0 * size_delta as f64 / size_before as f64
            );
        }
        Err(err) => {
            log::warn!("Failed to crunch PNG file {path:?}: {err}");
        }
    }
}
