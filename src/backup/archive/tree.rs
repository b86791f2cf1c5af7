use crate::backup::archive::{EntryErrorHandler, Skipped};
use crate::backup::compress::{create_compressed_file, finish_compressed_file, CompressorConfig};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use function_name::named;
use getset::CopyGetters;
use std::fs::{read_dir, DirEntry, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Counts of what went into an archive and what was left out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct ArchiveSummary {
    entries: usize,
    skipped: usize,
}

/// Archives everything below `src_dir` into a new compressed tarball at `dest`.
///
/// Entries are stored relative to `src_dir`. Directories are walked with an
/// explicit work-list so that a directory that cannot be listed, or an entry
/// that cannot be added, is handed to `handler` instead of failing the whole
/// archive. Symbolic links are stored as links and never followed.
///
/// When this returns an error, no file is left at `dest`.
#[named]
pub fn create_tree_archive<H: EntryErrorHandler + ?Sized>(
    src_dir: &Path,
    dest: &Path,
    compressor: &CompressorConfig,
    handler: &H,
) -> Result<ArchiveSummary> {
    if !src_dir.is_dir() {
        return Err(Error::from(io::Error::other(format!(
            "{:?} is not a directory",
            src_dir
        ))))
        .with_debug_object_and_fn_name(src_dir.to_path_buf(), function_path!());
    }

    info!("Archiving {:?} into {:?}", src_dir, dest);
    let summary = write_archive(src_dir, dest, compressor, handler)
        .with_debug_object_and_fn_name(src_dir.to_path_buf(), function_path!())?;
    info!(
        "Archive {:?} complete: {} entries added, {} skipped",
        dest,
        summary.entries,
        summary.skipped
    );
    Ok(summary)
}

fn write_archive<H: EntryErrorHandler + ?Sized>(
    src_dir: &Path,
    dest: &Path,
    compressor: &CompressorConfig,
    handler: &H,
) -> Result<ArchiveSummary> {
    let mut builder = tar::Builder::new(create_compressed_file(dest, compressor)?);
    builder.follow_symlinks(false);

    let res = append_tree(&mut builder, src_dir, handler)
        .and_then(|summary| Ok((summary, builder.into_inner()?)))
        .and_then(|(summary, writer)| finish_compressed_file(writer).map(|_| summary));

    if res.is_err() {
        if let Err(e) = std::fs::remove_file(dest) {
            warn!("Removing incomplete archive {:?} failed: {}", dest, e);
        }
    }
    res
}

/// Walks `src_dir` depth first, appending every entry to `builder`.
pub fn append_tree<W: Write, H: EntryErrorHandler + ?Sized>(
    builder: &mut tar::Builder<W>,
    src_dir: &Path,
    handler: &H,
) -> Result<ArchiveSummary> {
    let mut summary = ArchiveSummary::default();
    let mut to_visit = vec![PathBuf::new()];

    while let Some(rel_dir) = to_visit.pop() {
        let dir = src_dir.join(&rel_dir);
        let children = match list_children(&dir) {
            Ok(children) => children,
            Err(e) => {
                summary.skipped += 1;
                handler.on_error(Skipped::Subtree(&dir), e.into())?;
                continue;
            }
        };

        for child in children {
            let rel_path = rel_dir.join(child.file_name());
            let path = child.path();
            match append_child(builder, &child, &path, &rel_path)? {
                Ok(is_dir) => {
                    trace!("Added {:?} as {:?}", path, rel_path);
                    summary.entries += 1;
                    if is_dir {
                        to_visit.push(rel_path);
                    }
                }
                Err(e) => {
                    summary.skipped += 1;
                    handler.on_error(Skipped::Entry(&path), e)?;
                }
            }
        }
    }

    Ok(summary)
}

fn list_children(dir: &Path) -> io::Result<Vec<DirEntry>> {
    debug!("Listing {:?}", dir);
    let mut children = read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_unstable_by_key(DirEntry::file_name);
    Ok(children)
}

/// Appends one child, returning whether it is a directory to descend into.
///
/// The inner error means nothing was written for the child, so it can be
/// skipped. The outer error means the archive stream itself is broken.
fn append_child<W: Write>(
    builder: &mut tar::Builder<W>,
    child: &DirEntry,
    path: &Path,
    rel_path: &Path,
) -> Result<Result<bool>> {
    let file_type = match child.file_type() {
        Ok(file_type) => file_type,
        Err(e) => return Ok(Err(e.into())),
    };

    if file_type.is_dir() {
        Ok(builder.append_dir(rel_path, path).map(|_| true).map_err(Error::from))
    } else if file_type.is_file() {
        let (file, meta) = match open_snapshot(path) {
            Ok(opened) => opened,
            Err(e) => return Ok(Err(e)),
        };
        append_file(builder, file, &meta, rel_path)?;
        Ok(Ok(false))
    } else {
        Ok(builder
            .append_path_with_name(path, rel_path)
            .map(|_| false)
            .map_err(Error::from))
    }
}

fn open_snapshot(path: &Path) -> Result<(File, Metadata)> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::other(format!("{:?} is no longer a regular file", path)).into());
    }
    Ok((file, meta))
}

/// Writes `file` with exactly the size recorded in `meta`.
///
/// Bytes appended after `meta` was taken are left out and a file that shrank
/// is padded with zeros, so the header always matches the data that follows.
fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    file: File,
    meta: &Metadata,
    rel_path: &Path,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_metadata(meta);

    let mut data = FixedLength::new(file, meta.len());
    builder
        .append_data(&mut header, rel_path, &mut data)
        .map_err(Error::from)
        .with_msg(format!("Writing {:?} into the archive failed", rel_path))?;

    if data.padded > 0 {
        warn!(
            "{:?} shrank while being archived, padded {} missing bytes with zeros",
            rel_path, data.padded
        );
    }
    Ok(())
}

/// Reads exactly `remaining` bytes from `inner`, zero-filling after an early EOF.
struct FixedLength<R> {
    inner: io::Take<R>,
    remaining: u64,
    padded: u64,
}

impl<R: Read> FixedLength<R> {
    fn new(inner: R, len: u64) -> Self {
        FixedLength {
            inner: inner.take(len),
            remaining: len,
            padded: 0,
        }
    }
}

impl<R: Read> Read for FixedLength<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let mut read = self.inner.read(&mut buf[..want])?;
        if read == 0 {
            buf[..want].fill(0);
            self.padded += want as u64;
            read = want;
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}
