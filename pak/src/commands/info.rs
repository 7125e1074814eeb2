use pak_format::{ByteSource, EntryRecord, PakReader};

use crate::cli::InfoArgs;
use crate::error::{Error, Result};
use crate::util::{format_size, open_archive, ratio};

pub fn run(args: InfoArgs) -> Result<()> {
    let reader = open_archive(&args.archive)?;

    if let Some(file_path) = &args.file {
        let entry = reader
            .entry(file_path)
            .map_err(|source| Error::EntryNotFound {
                path: file_path.clone(),
                source,
            })?;
        show_entry_info(&reader, entry);
        return Ok(());
    }

    show_archive_info(&reader, &args)
}

fn show_entry_info<S: ByteSource>(reader: &PakReader<S>, entry: &EntryRecord) {
    println!("Path:  {}", entry.path);
    println!("Compression: {}", entry.compression);
    println!(
        "Size:  {} (compressed: {})",
        format_size(entry.uncompressed_size),
        format_size(entry.compressed_size)
    );
    println!(
        "Ratio: {:.1}%",
        ratio(entry.compressed_size, entry.uncompressed_size)
    );
    println!("Encrypted: {}", if entry.encrypted { "yes" } else { "no" });

    println!();
    println!("Record:");
    println!("  Index:  {}", entry.index());
    println!("  Offset: {:#x}", entry.data_offset);
    match entry.digest {
        Some(digest) => println!("  SHA-1:  {}", digest),
        None => println!("  SHA-1:  -"),
    }

    let group = reader
        .index()
        .ok()
        .and_then(|index| Some((index, index.overlap_group(entry.index())?)));
    if let Some((index, group)) = group {
        println!();
        println!(
            "Shares bytes {:#x}..{:#x} with {} other entries, including:",
            group.range.start,
            group.range.end,
            group.entries.len() - 1
        );
        for &other in group
            .entries
            .iter()
            .filter(|&&i| i != entry.index())
            .take(10)
        {
            println!("  {}", index.entries()[other].path);
        }
    }
}

fn show_archive_info<S: ByteSource>(reader: &PakReader<S>, args: &InfoArgs) -> Result<()> {
    let info = reader.info().map_err(|source| Error::ReadArchive {
        path: args.archive.clone(),
        source,
    })?;

    println!("Archive:     {}", args.archive.display());
    println!("Version:     {}", info.version);
    println!("Header:      {}", if info.has_header { "yes" } else { "no" });
    println!("File size:   {}", format_size(info.file_size));

    println!();
    println!("Index:");
    println!("  Offset:    {:#x}", info.index_offset);
    println!("  Size:      {}", format_size(info.index_size));
    match info.index_digest {
        Some(digest) => println!("  {}:     {}", info.checksum, digest),
        None => println!("  {}:     -", info.checksum),
    }

    println!();
    println!("Contents:");
    println!("  Entries:     {}", info.entry_count);
    if info.encrypted_entries > 0 {
        println!("  Encrypted:   {}", info.encrypted_entries);
    }
    if info.overlap_groups > 0 {
        println!(
            "  Overlapping: {} entries in {} groups",
            info.overlapping_entries, info.overlap_groups
        );
    }

    println!();
    println!("Size:");
    println!("  Original:    {}", format_size(info.total_uncompressed));
    println!("  Compressed:  {}", format_size(info.total_compressed));
    println!(
        "  Ratio:       {:.1}%",
        ratio(info.total_compressed, info.total_uncompressed)
    );

    Ok(())
}
