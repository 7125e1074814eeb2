use std::path::PathBuf;

use miette::Diagnostic;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("Cannot open archive `{}`", .path.display())]
    #[diagnostic(help("Is this a valid .pak file?"))]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: pak_format::Error,
    },

    #[error("Cannot read archive `{}`", .path.display())]
    ReadArchive {
        path: PathBuf,
        #[source]
        source: pak_format::Error,
    },

    #[error("No entry `{path}` in archive")]
    #[diagnostic(help("Run `pak list` to see the archive contents"))]
    EntryNotFound {
        path: String,
        #[source]
        source: pak_format::Error,
    },

    #[error("Cannot create directory `{}`", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot determine the current directory")]
    CurrentDir {
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot extract files")]
    Extract {
        #[source]
        source: pak_format::Error,
    },

    #[error("{failures} of {total} entries failed to extract")]
    ExtractFailures { failures: u64, total: usize },

    #[error("{failures} entries failed validation")]
    ValidateFailures { failures: u64 },
}
