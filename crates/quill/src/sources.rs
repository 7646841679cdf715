//! Directory-backed sources.

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use quill_backend::{BackendError, ErrorKind, Granularity, SourceProvider};
use tokio::fs;

/// Number of leading lines served at the summary granularity.
const SUMMARY_LINES: usize = 40;

/// Error type for [`DirSourceProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

fn io_error(path: &Path, err: std::io::Error) -> Error {
    Error {
        message: format!("{}: {err}", path.display()),
        kind: ErrorKind::Other,
    }
}

/// A source provider backed by a local directory.
///
/// Every regular file in the directory is a source named after its file
/// stem. The full granularity serves the whole file and the summary
/// granularity serves the leading lines.
#[derive(Clone, Debug)]
pub struct DirSourceProvider {
    dir: PathBuf,
}

impl DirSourceProvider {
    /// Creates a provider serving files from `dir`.
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SourceProvider for DirSourceProvider {
    type Error = Error;

    fn list_source_names(
        &self,
    ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'static
    {
        let dir = self.dir.clone();
        async move {
            let mut names: Vec<String> = source_files(&dir)
                .await?
                .into_iter()
                .filter_map(|path| {
                    Some(path.file_stem()?.to_str()?.to_owned())
                })
                .collect();
            names.sort();
            names.dedup();
            Ok(names)
        }
    }

    fn fetch_source_text(
        &self,
        name: &str,
        granularity: Granularity,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static
    {
        let dir = self.dir.clone();
        let name = name.to_owned();
        async move {
            let path = source_files(&dir)
                .await?
                .into_iter()
                .find(|path| {
                    path.file_stem().and_then(|s| s.to_str())
                        == Some(name.as_str())
                })
                .ok_or_else(|| Error {
                    message: format!("unknown source: {name}"),
                    kind: ErrorKind::Other,
                })?;
            let text = fs::read_to_string(&path)
                .await
                .map_err(|err| io_error(&path, err))?;
            Ok(match granularity {
                Granularity::Full => text,
                Granularity::Summary => text
                    .lines()
                    .take(SUMMARY_LINES)
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
        }
    }
}

async fn source_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|err| io_error(dir, err))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| io_error(dir, err))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|err| io_error(&entry.path(), err))?;
        if file_type.is_file() {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}
