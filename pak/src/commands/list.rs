use pak_format::{EntryRecord, PakReader};

use crate::cli::ListArgs;
use crate::error::{Error, Result};
use crate::util::{format_size, open_archive, ratio};

pub fn run(args: ListArgs) -> Result<()> {
    let reader = open_archive(&args.archive)?;
    let entries = reader.entries().map_err(|source| Error::ReadArchive {
        path: args.archive.clone(),
        source,
    })?;

    if args.long {
        list_long(&reader, entries);
    } else {
        list_compact(entries);
    }
    Ok(())
}

fn list_compact(entries: &[EntryRecord]) {
    println!("{:>12}  {:>12}  {:>6}  Path", "Compressed", "Size", "Ratio");
    println!("{}", "-".repeat(60));

    let mut total_compressed = 0u64;
    let mut total_size = 0u64;

    for entry in entries {
        println!(
            "{:>12}  {:>12}  {:>5.1}%  {}",
            format_size(entry.compressed_size),
            format_size(entry.uncompressed_size),
            ratio(entry.compressed_size, entry.uncompressed_size),
            entry.path
        );
        total_compressed += entry.compressed_size;
        total_size += entry.uncompressed_size;
    }

    println!("{}", "-".repeat(60));
    println!(
        "{:>12}  {:>12}  {:>5.1}%  Total",
        format_size(total_compressed),
        format_size(total_size),
        ratio(total_compressed, total_size)
    );
}

fn list_long<S: pak_format::ByteSource>(reader: &PakReader<S>, entries: &[EntryRecord]) {
    let index = reader.index().ok();

    println!(
        "{:10}  {:>12}  {:>12}  {:>12}  {:>16}  Path",
        "Method", "Offset", "Compressed", "Size", "Checksum"
    );
    println!("{}", "-".repeat(100));

    for entry in entries {
        let checksum = entry
            .digest
            .map(|d| d.to_hex()[..16].to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut notes = vec![];
        if entry.encrypted {
            notes.push("encrypted");
        }
        if index.is_some_and(|index| index.overlap_group(entry.index()).is_some()) {
            notes.push("overlaps");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!("  [{}]", notes.join(", "))
        };

        println!(
            "{:10}  {:>#12x}  {:>12}  {:>12}  {:>16}  {}{}",
            entry.compression.to_string(),
            entry.data_offset,
            format_size(entry.compressed_size),
            format_size(entry.uncompressed_size),
            checksum,
            entry.path,
            notes
        );
    }
}
