//! Subtree snapshots: a zstd-compressed tar rooted at the object's name.
//!
//! Every entry of a snapshot lives below one top-level directory named
//! after the archived object, so a snapshot unpacks into exactly one new
//! child object wherever it lands.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path};

use ra_types::layout::EXT_DIR;
use tracing::debug;
use walkdir::WalkDir;

const ZSTD_LEVEL: i32 = 3;

/// Pack the object directory `dir` into `out` under the top-level name
/// `name`.
///
/// Without `recursive` only the object's own files are packed, leaving out
/// its child objects.
pub fn pack_object<W: Write>(dir: &Path, name: &str, recursive: bool, out: W) -> io::Result<()> {
    let encoder = zstd::stream::write::Encoder::new(out, ZSTD_LEVEL)?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir(name, dir)?;

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| recursive || e.depth() > 1 || e.file_name() != EXT_DIR);

    let mut entries = 0usize;
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !recursive && entry.depth() > 1 {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = Path::new(name).join(rel);
        builder.append_path_with_name(entry.path(), &target)?;
        entries += 1;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?.flush()?;
    debug!(object = %dir.display(), entries, recursive, "object packed");
    Ok(())
}

/// Pack `dir` into the file `blob`, replacing it.
pub fn pack_to_file(dir: &Path, name: &str, recursive: bool, blob: &Path) -> io::Result<()> {
    let file = File::create(blob)?;
    pack_object(dir, name, recursive, BufWriter::new(file))
}

/// The single top-level name every entry of `blob` lives under.
pub fn archive_top_name(blob: &Path) -> io::Result<String> {
    let decoder = zstd::stream::read::Decoder::new(BufReader::new(File::open(blob)?))?;
    let mut archive = tar::Archive::new(decoder);
    let mut top: Option<String> = None;
    for entry in archive.entries()? {
        let entry = entry?;
        let path = entry.path()?;
        let first = match path.components().next() {
            Some(Component::Normal(first)) => first.to_string_lossy().into_owned(),
            _ => return Err(invalid("archive entry outside a top-level object")),
        };
        match &top {
            None => top = Some(first),
            Some(existing) if *existing == first => {}
            Some(_) => return Err(invalid("archive holds more than one top-level object")),
        }
    }
    top.ok_or_else(|| invalid("empty archive"))
}

/// Unpack `blob` into the directory `dest`.
///
/// Entries escaping `dest` are refused by the tar reader.
pub fn unpack(blob: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let decoder = zstd::stream::read::Decoder::new(BufReader::new(File::open(blob)?))?;
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(false);
    archive.unpack(dest)?;
    debug!(dest = %dest.display(), "archive unpacked");
    Ok(())
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
