//! Logo

use std::{
    fmt,
    num::NonZeroU32,
    path::{Path, PathBuf},
};

use heck::ToSnakeCase as _;
use reqwest::Url;

/// Name of the directory holding resized variants, under the output directory
const CAROUSEL_DIR_NAME: &str = "carousel";

/// How many leading bytes are inspected to detect SVG content
const SVG_SNIFF_LEN: usize = 4096;

/// Logo metadata that can be known or uncertain
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(crate) enum Metadata<T> {
    /// Exact value is known
    Known(T),
    /// Value is uncertain, we only have a hint
    Uncertain(T),
}

impl<T> Metadata<T> {
    pub(crate) fn known(v: T) -> Self {
        Self::Known(v)
    }

    pub(crate) fn uncertain(v: T) -> Self {
        Self::Uncertain(v)
    }

    pub(crate) fn value_hint(&self) -> &T {
        match self {
            Metadata::Known(v) | Metadata::Uncertain(v) => v,
        }
    }
}

/// Image format
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    strum::EnumString,
    strum::VariantArray,
    strum::Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Format {
    /// Scalable Vector Graphics
    Svg,
    /// PNG
    Png,
    /// JPEG
    #[strum(to_string = "jpg", serialize = "jpeg")]
    Jpeg,
    /// GIF
    Gif,
    /// WebP
    Webp,
}

impl Format {
    /// Guess format from extension (without dot)
    pub(crate) fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Guess format from a MIME type, like `image/svg+xml` or `image/png; charset=binary`
    pub(crate) fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/svg+xml" | "image/svg" => Some(Self::Svg),
            "image/png" | "image/x-png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Guess format from the extension of the last URL path segment
    pub(crate) fn from_url(url: &Url) -> Option<Self> {
        let filename = url.path_segments()?.next_back()?;
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Detect format from file content
    pub(crate) fn sniff(data: &[u8]) -> Option<Self> {
        if looks_like_svg(data) {
            return Some(Self::Svg);
        }
        match image::guess_format(data).ok()? {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }

    /// Get canonical extension for format
    pub(crate) fn extension(self) -> &'static str {
        match self {
            Format::Svg => "svg",
            Format::Png => "png",
            Format::Jpeg => "jpg",
            Format::Gif => "gif",
            Format::Webp => "webp",
        }
    }

    /// Return true if format is vector based
    pub(crate) fn is_vector(self) -> bool {
        matches!(self, Format::Svg)
    }

    /// Return true if format can carry an alpha channel
    pub(crate) fn supports_alpha(self) -> bool {
        !matches!(self, Format::Jpeg)
    }

    /// Get image format as the image crate type, if it is a raster format
    pub(crate) fn to_image_format(self) -> Option<image::ImageFormat> {
        match self {
            Format::Svg => None,
            Format::Png => Some(image::ImageFormat::Png),
            Format::Jpeg => Some(image::ImageFormat::Jpeg),
            Format::Gif => Some(image::ImageFormat::Gif),
            Format::Webp => Some(image::ImageFormat::WebP),
        }
    }
}

/// Return true if data is an XML document whose root element is `svg`.
/// The XML declaration, processing instructions, comments and a `svg` doctype may precede it.
fn looks_like_svg(data: &[u8]) -> bool {
    let head = data.get(..SVG_SNIFF_LEN).unwrap_or(data);
    let head = String::from_utf8_lossy(head);
    let mut rest = head.trim_start_matches('\u{feff}');
    loop {
        rest = rest.trim_start();
        let next = if let Some(pi) = rest.strip_prefix("<?") {
            pi.split_once("?>").map(|(_, after)| after)
        } else if let Some(comment) = rest.strip_prefix("<!--") {
            comment.split_once("-->").map(|(_, after)| after)
        } else if let Some(decl) = rest.strip_prefix("<!") {
            skip_svg_doctype(decl)
        } else {
            return rest.strip_prefix("<svg").is_some_and(|after| {
                after.starts_with(|c: char| c.is_ascii_whitespace() || (c == '>') || (c == '/'))
            });
        };
        match next {
            Some(after) => rest = after,
            None => return false,
        }
    }
}

/// Skip a doctype declaration, after its leading `<!`, only if it declares a `svg` root
fn skip_svg_doctype(decl: &str) -> Option<&str> {
    let lower = decl.to_ascii_lowercase();
    let root = lower.strip_prefix("doctype")?.trim_start();
    if !root.starts_with("svg") {
        return None;
    }
    // internal subset can contain '>'
    let end = match (decl.find('['), decl.find('>')) {
        (Some(subset), Some(close)) if subset < close => decl.find("]>")? + 2,
        (_, Some(close)) => close + 1,
        (_, None) => return None,
    };
    decl.get(end..)
}

/// An image search result
#[derive(Clone, Debug)]
pub(crate) struct ImageCandidate {
    /// Image URL
    pub url: Url,
    /// Format, known if the API gave a MIME type, otherwise guessed from URL
    pub format: Metadata<Format>,
    /// Image size in pixels, if the API reported it
    pub size_px: Option<(u32, u32)>,
    /// Rank in API results
    pub rank: usize,
    /// Result title
    pub title: String,
}

impl fmt::Display for ImageCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.rank, self.format.value_hint())?;
        if let Metadata::Uncertain(_) = self.format {
            write!(f, "[?]")?;
        }
        match self.size_px {
            Some((w, h)) => write!(f, " {w}x{h}")?,
            None => write!(f, " ?x?")?,
        }
        write!(f, " {}", self.url)
    }
}

/// A logo saved to disk
#[derive(Clone, Debug)]
pub struct DownloadedLogo {
    /// Company the logo belongs to
    pub company: String,
    /// Validated format
    pub format: Format,
    /// Output file
    pub path: PathBuf,
    /// File size
    pub byte_size: u64,
    /// Whether the image has transparent pixels, if known
    pub is_transparent: Option<bool>,
    /// Size in pixels, for raster images
    pub size_px: Option<(u32, u32)>,
    /// Content hash, used to detect duplicates
    pub hash: blake3::Hash,
}

/// Bounding box for carousel variants
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CarouselBox {
    /// Maximum width
    pub width: NonZeroU32,
    /// Maximum height
    pub height: NonZeroU32,
}

impl CarouselBox {
    /// Build box, fails if any dimension is zero
    #[must_use]
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }
}

impl fmt::Display for CarouselBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How a carousel variant was produced
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VariantKind {
    /// Scaled down or rasterized to fit the box
    Resized,
    /// Already fitting the box, copied as is
    Copied,
    /// Vector image copied without rasterization, because it is not supported
    Unresized,
}

/// A logo variant for the carousel
#[derive(Clone, Debug)]
pub struct CarouselVariant {
    /// Path of the logo this variant was produced from
    pub source: PathBuf,
    /// Bounding box the variant was fitted to
    pub target: CarouselBox,
    /// Size in pixels, if known
    pub size_px: Option<(u32, u32)>,
    /// Output file
    pub path: PathBuf,
    /// How the variant was produced
    pub kind: VariantKind,
}

/// Directory where originals of a given format are saved
pub(crate) fn format_dir(output_dir: &Path, format: Format) -> PathBuf {
    output_dir.join(format.to_string())
}

/// Directory where carousel variants of a given format are saved
pub(crate) fn carousel_dir(output_dir: &Path, format: Format) -> PathBuf {
    output_dir
        .join(CAROUSEL_DIR_NAME)
        .join(format.to_string())
}

/// Build a file name safe slug from a company name
pub(crate) fn company_slug(name: &str) -> String {
    let ascii_folded: String = name
        .chars()
        .map(|oc| {
            let mut nc = None;
            unicode_normalization::char::decompose_canonical(oc, |c| {
                nc.get_or_insert(c);
            });
            let c = nc.unwrap_or(oc);
            if c.is_alphanumeric() { c } else { ' ' }
        })
        .collect();
    let slug = ascii_folded.to_snake_case();
    if slug.is_empty() {
        "company".to_owned()
    } else {
        slug
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;

    /// Encode a test image, with a transparent top left pixel if `transparent` is set
    pub(crate) fn raster_bytes(width: u32, height: u32, transparent: bool, format: Format) -> Vec<u8> {
        let mut img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 255]));
        if transparent {
            img.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        }
        let img = image::DynamicImage::ImageRgba8(img);
        let img = if format == Format::Jpeg {
            image::DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            img
        };
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format.to_image_format().unwrap())
            .unwrap();
        buf.into_inner()
    }

    /// PNG test image
    pub(crate) fn png_bytes(width: u32, height: u32, transparent: bool) -> Vec<u8> {
        raster_bytes(width, height, transparent, Format::Png)
    }

    /// SVG test image with given intrinsic size
    pub(crate) fn svg_bytes(width: u32, height: u32) -> Vec<u8> {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\
             <rect x=\"0\" y=\"0\" width=\"{w2}\" height=\"{height}\" fill=\"#ff0000\"/></svg>",
            w2 = width / 2
        )
        .into_bytes()
    }

    #[test]
    fn slug() {
        assert_eq!(company_slug("Acme"), "acme");
        assert_eq!(company_slug("Björk & Co."), "bjork_co");
        assert_eq!(company_slug("  Coca-Cola  "), "coca_cola");
        assert_eq!(company_slug("AT&T"), "at_t");
        assert_eq!(company_slug("!!!"), "company");
    }

    #[test]
    fn parse_format() {
        assert_eq!("svg".parse::<Format>().unwrap(), Format::Svg);
        assert_eq!("PNG".parse::<Format>().unwrap(), Format::Png);
        assert_eq!("jpg".parse::<Format>().unwrap(), Format::Jpeg);
        assert_eq!("jpeg".parse::<Format>().unwrap(), Format::Jpeg);
        assert!("bmp".parse::<Format>().is_err());
        assert_eq!(Format::Jpeg.to_string(), "jpg");
        assert_eq!(Format::Webp.to_string(), "webp");
    }

    #[test]
    fn format_from_mime() {
        assert_eq!(Format::from_mime("image/svg+xml"), Some(Format::Svg));
        assert_eq!(Format::from_mime("image/PNG"), Some(Format::Png));
        assert_eq!(
            Format::from_mime("image/jpeg; charset=binary"),
            Some(Format::Jpeg)
        );
        assert_eq!(Format::from_mime("text/html"), None);
        assert_eq!(Format::from_mime(""), None);
    }

    #[test]
    fn format_from_url() {
        let url: Url = "https://example.com/img/logo.SVG?x=1".parse().unwrap();
        assert_eq!(Format::from_url(&url), Some(Format::Svg));
        let url: Url = "https://example.com/img/logo".parse().unwrap();
        assert_eq!(Format::from_url(&url), None);
        let url: Url = "https://example.com/".parse().unwrap();
        assert_eq!(Format::from_url(&url), None);
    }

    #[test]
    fn sniff_svg() {
        assert_eq!(
            Format::sniff(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
            Some(Format::Svg)
        );
        assert_eq!(
            Format::sniff(
                "\u{feff}\n  <?xml version=\"1.0\"?>\n<!-- logo -->\n<svg width=\"1\"/>".as_bytes()
            ),
            Some(Format::Svg)
        );
        assert_eq!(
            Format::sniff(
                b"<?xml version=\"1.0\"?>\n<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \
                  \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\" [<!ENTITY a \"b\">]>\n\
                  <svg viewBox=\"0 0 1 1\"></svg>"
            ),
            Some(Format::Svg)
        );
        assert_eq!(Format::sniff(b"<html><body>nope</body></html>"), None);
        assert_eq!(
            Format::sniff(
                b"<!DOCTYPE html><html><head><title>Acme</title></head>\
                  <body><svg width=\"10\" height=\"10\"></svg><p>Buy now</p></body></html>"
            ),
            None
        );
        assert_eq!(
            Format::sniff(b"<div><svg width=\"10\" height=\"10\"></svg></div>"),
            None
        );
        assert_eq!(Format::sniff(b"<svgfoo/>"), None);
        assert_eq!(Format::sniff(b"<!-- never closed <svg/>"), None);
        assert_eq!(Format::sniff(b"logo <svg/>"), None);
        assert_eq!(Format::sniff(b""), None);
    }

    #[test]
    fn sniff_raster() {
        assert_eq!(Format::sniff(&png_bytes(2, 2, false)), Some(Format::Png));
        assert_eq!(Format::sniff(&svg_bytes(2, 2)), Some(Format::Svg));
        assert_eq!(Format::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(Format::Jpeg));
        assert_eq!(Format::sniff(b"GIF89a......"), Some(Format::Gif));
    }

    #[test]
    fn output_dirs() {
        let out = Path::new("data/logos");
        assert_eq!(format_dir(out, Format::Jpeg), Path::new("data/logos/jpg"));
        assert_eq!(
            carousel_dir(out, Format::Svg),
            Path::new("data/logos/carousel/svg")
        );
    }
}
