use pak_format::ExtractOptions;

use crate::cli::ValidateArgs;
use crate::error::{Error, Result};
use crate::util::open_archive;

pub fn run(args: ValidateArgs) -> Result<()> {
    let reader = open_archive(&args.archive)?;
    let options = ExtractOptions {
        jobs: args.jobs,
        ..Default::default()
    };
    let stats = reader
        .validate_all_with_options(&options)
        .map_err(|source| Error::ReadArchive {
            path: args.archive.clone(),
            source,
        })?;

    if !args.quiet {
        for failure in &stats.failures {
            if let Err(e) = &failure.outcome {
                eprintln!("  {}: {}", failure.path, e);
            }
        }
        println!(
            "Validated {} files ({} without checksum, {} failures)",
            stats.files_checked, stats.files_without_checksum, stats.checksum_failures
        );
    }

    let failures = stats.failures.len() as u64;
    if failures > 0 {
        return Err(Error::ValidateFailures { failures });
    }

    Ok(())
}
