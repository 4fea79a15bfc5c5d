//! Export of carousel variants with website friendly file names

use std::{
    collections::{BTreeMap, HashMap},
    fmt, fs, io,
    path::{Path, PathBuf},
};

use crate::logo::{Format, company_slug};

/// Website export error
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    /// Input directory or one of its subdirectories could not be listed
    #[error("Failed to read dir {path:?}: {err}")]
    ReadDir {
        /// Directory path
        path: PathBuf,
        /// Underlying error
        err: io::Error,
    },
    /// Output directory could not be created
    #[error("Failed to create dir {path:?}: {err}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// Underlying error
        err: io::Error,
    },
    /// A file could not be copied
    #[error("Failed to copy {src:?} to {dst:?}: {err}")]
    Copy {
        /// Source file
        src: PathBuf,
        /// Destination file
        dst: PathBuf,
        /// Underlying error
        err: io::Error,
    },
}

/// Outcome of a website export
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Exported files, by company slug
    pub exported: BTreeMap<String, Vec<PathBuf>>,
    /// Per file errors
    pub errors: Vec<ExportError>,
}

impl ExportReport {
    /// Count of exported files
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.exported.values().map(Vec::len).sum()
    }
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exported.is_empty() {
            write!(f, "No files were exported")?;
        } else {
            write!(
                f,
                "{} files exported for {} companies",
                self.file_count(),
                self.exported.len()
            )?;
            for (company, files) in &self.exported {
                write!(f, "\n{company}: {} files", files.len())?;
                for file in files {
                    write!(f, "\n  - {}", file.display())?;
                }
            }
        }
        for err in &self.errors {
            write!(f, "\nError: {err}")?;
        }
        Ok(())
    }
}

/// A logo file found in the input tree
#[derive(Debug)]
struct SourceFile {
    path: PathBuf,
    company: String,
    web_name: String,
    index: Option<u32>,
    extension: &'static str,
}

impl SourceFile {
    /// Parse a `<slug>_<n>.<ext>` file name, or any `<name>.<ext>` image file name
    fn parse(path: PathBuf) -> Option<Self> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)?;
        let stem = path.file_stem()?.to_str()?;
        let (company, index) = match stem.rsplit_once('_') {
            Some((company, n)) if !company.is_empty() && !n.is_empty() => {
                match n.parse::<u32>() {
                    Ok(index) if n.bytes().all(|b| b.is_ascii_digit()) => (company, Some(index)),
                    _ => (stem, None),
                }
            }
            _ => (stem, None),
        };
        if !company.chars().any(char::is_alphanumeric) {
            log::warn!("Skipping {path:?} with no usable name");
            return None;
        }
        let company = company_slug(company);
        let web_name: String = company
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();
        if web_name.is_empty() {
            log::warn!("Skipping {path:?} with no ASCII name");
            return None;
        }
        Some(Self {
            path,
            company,
            web_name,
            index,
            extension: format.extension(),
        })
    }
}

/// Collect image files under `root`, recursively
fn collect_files(root: &Path, report: &mut ExportReport) -> Result<Vec<SourceFile>, ExportError> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_owned()];
    let mut is_root = true;
    while let Some(dir) = dirs.pop() {
        let dir_it = match fs::read_dir(&dir) {
            Ok(dir_it) => dir_it,
            Err(err) if is_root => return Err(ExportError::ReadDir { path: dir, err }),
            Err(err) => {
                log::warn!("Failed to read dir {dir:?}: {err}");
                report.errors.push(ExportError::ReadDir { path: dir, err });
                continue;
            }
        };
        is_root = false;
        for entry_res in dir_it {
            let entry = match entry_res {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Failed to read dir {dir:?} entry: {err}");
                    continue;
                }
            };
            let ftype = match entry.file_type() {
                Ok(ftype) => ftype,
                Err(err) => {
                    log::warn!("Failed to read dir {dir:?} entry: {err}");
                    continue;
                }
            };
            let path = entry.path();
            if ftype.is_dir() {
                dirs.push(path);
            } else if ftype.is_file() {
                if let Some(file) = SourceFile::parse(path) {
                    files.push(file);
                } else {
                    log::debug!("Ignoring {:?}", entry.path());
                }
            }
        }
    }
    Ok(files)
}

/// Copy logo files found under `input_dir` to `output_dir`, named `<company><n>.<ext>`.
///
/// Company names are lowercased and stripped of anything but ASCII letters and digits.
/// The first file for a company and extension is named `<company>.<ext>`, the next ones
/// `<company>2.<ext>`, `<company>3.<ext>`, etc. in source index order.
/// If `companies` is not empty, only files of these companies are exported.
pub fn export_logos<S>(
    input_dir: &Path,
    output_dir: &Path,
    companies: &[S],
) -> Result<ExportReport, ExportError>
where
    S: AsRef<str>,
{
    let mut report = ExportReport::default();
    let wanted: Vec<String> = companies
        .iter()
        .map(|name| company_slug(name.as_ref()))
        .collect();

    let mut files = collect_files(input_dir, &mut report)?;
    files.retain(|file| wanted.is_empty() || wanted.contains(&file.company));
    files.sort_unstable_by(|a, b| {
        (&a.web_name, a.extension, a.index, &a.path).cmp(&(
            &b.web_name,
            b.extension,
            b.index,
            &b.path,
        ))
    });
    log::info!("Found {} files to export in {input_dir:?}", files.len());
    if files.is_empty() {
        return Ok(report);
    }

    fs::create_dir_all(output_dir).map_err(|err| ExportError::CreateDir {
        path: output_dir.to_owned(),
        err,
    })?;

    let mut counts: HashMap<(String, &'static str), usize> = HashMap::new();
    for file in files {
        let count = counts
            .entry((file.web_name.clone(), file.extension))
            .or_default();
        *count += 1;
        let filename = if *count == 1 {
            format!("{}.{}", file.web_name, file.extension)
        } else {
            format!("{}{count}.{}", file.web_name, file.extension)
        };
        let dst = output_dir.join(filename);
        match fs::copy(&file.path, &dst) {
            Ok(_) => {
                log::info!("Copied {:?} to {dst:?}", file.path);
                report.exported.entry(file.company).or_default().push(dst);
            }
            Err(err) => {
                let err = ExportError::Copy {
                    src: file.path,
                    dst,
                    err,
                };
                log::warn!("{err}");
                report.errors.push(err);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel.as_bytes()).unwrap();
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn renames_per_company_and_extension() {
        let _ = simple_logger::init_with_env();
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        touch(input.path(), "png/acme_10.png");
        touch(input.path(), "png/acme_2.png");
        touch(input.path(), "png/acme_1.png");
        touch(input.path(), "png/globex_corp_1.png");
        touch(input.path(), "svg/acme_1.png");
        touch(input.path(), "jpg/acme_3.jpeg");
        touch(input.path(), "svg/notes.txt");

        let report = export_logos::<&str>(input.path(), output.path(), &[]).unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.file_count(), 6);
        assert_eq!(
            listing(output.path()),
            vec![
                "acme.jpg",
                "acme.png",
                "acme2.png",
                "acme3.png",
                "acme4.png",
                "globexcorp.png"
            ]
        );
        // index order, not lexicographic order
        assert_eq!(
            fs::read(output.path().join("acme3.png")).unwrap(),
            b"png/acme_2.png"
        );
        assert_eq!(
            fs::read(output.path().join("acme4.png")).unwrap(),
            b"png/acme_10.png"
        );
        assert_eq!(
            fs::read(output.path().join("acme.jpg")).unwrap(),
            b"jpg/acme_3.jpeg"
        );
        assert_eq!(report.exported["acme"].len(), 5);
        assert_eq!(
            report.exported["globex_corp"],
            vec![output.path().join("globexcorp.png")]
        );
        let summary = report.to_string();
        assert!(summary.starts_with("6 files exported for 2 companies"));
        assert!(summary.contains("globex_corp: 1 files"));
    }

    #[test]
    fn company_filter() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        touch(input.path(), "png/acme_1.png");
        touch(input.path(), "png/globex_corp_1.png");
        touch(input.path(), "svg/globex_corp_2.png");
        touch(input.path(), "png/initech_1.png");

        let companies = ["Globex Corp", "Initech"];
        let report = export_logos(input.path(), output.path(), companies.as_slice()).unwrap();

        assert_eq!(
            listing(output.path()),
            vec!["globexcorp.png", "globexcorp2.png", "initech.png"]
        );
        assert_eq!(
            report.exported.keys().collect::<Vec<_>>(),
            vec!["globex_corp", "initech"]
        );

        let other_output = tempfile::tempdir().unwrap();
        let empty =
            export_logos(input.path(), other_output.path(), ["Hooli"].as_slice()).unwrap();
        assert_eq!(empty.file_count(), 0);
        assert_eq!(empty.to_string(), "No files were exported");
    }

    #[test]
    fn file_names() {
        let numbered = SourceFile::parse(PathBuf::from("png/acme_7.PNG")).unwrap();
        assert_eq!(numbered.company, "acme");
        assert_eq!(numbered.web_name, "acme");
        assert_eq!(numbered.index, Some(7));
        assert_eq!(numbered.extension, "png");

        let free_form = SourceFile::parse(PathBuf::from("Acme Logo.svg")).unwrap();
        assert_eq!(free_form.company, "acme_logo");
        assert_eq!(free_form.web_name, "acmelogo");
        assert_eq!(free_form.index, None);

        let suffixed = SourceFile::parse(PathBuf::from("acme_v2.gif")).unwrap();
        assert_eq!(suffixed.company, "acme_v2");
        assert_eq!(suffixed.index, None);

        let accented = SourceFile::parse(PathBuf::from("Société Générale_2.png")).unwrap();
        assert_eq!(accented.company, "societe_generale");
        assert_eq!(accented.web_name, "societegenerale");
        assert_eq!(accented.index, Some(2));

        assert!(SourceFile::parse(PathBuf::from("acme_1.bmp")).is_none());
        assert!(SourceFile::parse(PathBuf::from("acme_1")).is_none());
        assert!(SourceFile::parse(PathBuf::from("___.png")).is_none());
    }

    #[test]
    fn missing_input_dir() {
        let output = tempfile::tempdir().unwrap();
        let input = output.path().join("missing");
        let err = export_logos::<&str>(&input, output.path(), &[]).unwrap_err();
        assert!(matches!(err, ExportError::ReadDir { path, .. } if path == input));
    }
}
