use std::time::Instant;

use pak_format::{ExtractOptions, PathPrefixes};

use crate::cli::ExtractArgs;
use crate::error::{Error, Result};
use crate::util::{format_size, open_archive};

pub fn run(args: ExtractArgs) -> Result<()> {
    let reader = open_archive(&args.archive)?;

    let output_path = match args.output {
        Some(path) => path,
        None => std::env::current_dir().map_err(|source| Error::CurrentDir { source })?,
    };

    std::fs::create_dir_all(&output_path).map_err(|source| Error::CreateDirectory {
        path: output_path.clone(),
        source,
    })?;

    for file in &args.files {
        reader.entry(file).map_err(|source| Error::EntryNotFound {
            path: file.clone(),
            source,
        })?;
    }

    let options = ExtractOptions {
        overwrite: args.overwrite,
        verify: !args.no_checksum,
        jobs: args.jobs,
        ..Default::default()
    };

    let prefixes = PathPrefixes::new(&args.prefixes);
    let started = Instant::now();
    let report = reader
        .extract_matching(
            &output_path,
            |entry| {
                (args.files.is_empty() || args.files.iter().any(|f| f == entry.path.as_str()))
                    && prefixes.matches(entry)
            },
            &options,
        )
        .map_err(|source| Error::Extract { source })?;

    if !args.quiet {
        for failure in report.failures() {
            if let Err(e) = &failure.outcome {
                eprintln!("  {}: {}", failure.path, e);
            }
        }
        println!(
            "Extracted {} files ({}) to {} in {:.2?}",
            report.stats.files_extracted,
            format_size(report.stats.bytes_written),
            output_path.display(),
            started.elapsed()
        );
    }

    if !report.is_success() {
        return Err(Error::ExtractFailures {
            failures: report.stats.failures,
            total: report.results.len(),
        });
    }

    Ok(())
}
