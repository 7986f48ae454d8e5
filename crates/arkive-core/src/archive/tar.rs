//! Tar archive backend with gzip, xz and zstd filters

use super::extractor::Extractor;
use super::filter::MemberFilter;
use super::packer::{self, open_source, run_pack, Member, MemberKind, Packer, Packing};
use super::session::{self, Extraction, Target};
use crate::detect::{format_from_extension, sniff, Sniffed, PROBE_LEN};
use crate::format::{ArchiveFormat, FormatFamily, TarFilter};
use crate::model::{ArchiveEntry, ExtractOptions, ExtractResult, PackOptions, PackResult};
use crate::progress::{Callbacks, CancelToken, CountingReader};
use crate::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::cell::Cell;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;
use zstd::stream::read::Decoder as ZstdDecoder;
use zstd::stream::write::Encoder as ZstdEncoder;

fn corrupt(context: impl std::fmt::Display, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::PermissionDenied => Error::PermissionDenied(format!("{}: {}", context, err)),
        _ => Error::CorruptedArchive(format!("{}: {}", context, err)),
    }
}

/// Decompressing tar stream plus a count of compressed bytes consumed
struct TarStream {
    archive: Archive<Box<dyn Read>>,
    consumed: Rc<Cell<u64>>,
    compressed_size: u64,
}

fn open_stream(path: &Path, filter: TarFilter) -> Result<TarStream> {
    let file = File::open(path).map_err(|e| Error::io(e, path.display()))?;
    let compressed_size = file
        .metadata()
        .map_err(|e| Error::io(e, path.display()))?
        .len();
    let (counted, consumed) = CountingReader::new(file);

    let decoder: Box<dyn Read> = match filter {
        TarFilter::Gzip => Box::new(GzDecoder::new(counted)),
        TarFilter::Xz => Box::new(XzDecoder::new(counted)),
        TarFilter::Zstd => {
            Box::new(ZstdDecoder::new(counted).map_err(|e| corrupt(path.display(), e))?)
        }
    };

    Ok(TarStream {
        archive: Archive::new(decoder),
        consumed,
        compressed_size,
    })
}

/// PAX and GNU extension records describe other members and are not members
fn is_extension_record(kind: EntryType) -> bool {
    kind.is_pax_global_extensions()
        || kind.is_pax_local_extensions()
        || kind.is_gnu_longname()
        || kind.is_gnu_longlink()
}

fn entry_from<R: Read>(item: &tar::Entry<'_, R>) -> Result<ArchiveEntry> {
    let header = item.header();
    let kind = header.entry_type();
    let path = item
        .path()
        .map_err(|e| corrupt("invalid member path", e))?;

    let size = item.size();
    let mut entry = ArchiveEntry::new(&path.to_string_lossy(), kind.is_dir()).with_sizes(0, size);
    entry.modified = header.mtime().ok().and_then(|t| i64::try_from(t).ok());
    entry.permissions = header.mode().ok().map(|m| m & 0o7777);
    entry.is_symlink = kind.is_symlink();
    entry.link_target = item
        .link_name()
        .ok()
        .flatten()
        .map(|target| target.to_string_lossy().replace('\\', "/"));
    Ok(entry)
}

/// Tar extractor
///
/// One instance serves all three filters. The filter actually used is taken
/// from the file's magic bytes, then its name, then the filter the extractor
/// was created for.
#[derive(Debug)]
pub struct TarExtractor {
    filter: TarFilter,
    cancel: CancelToken,
}

impl TarExtractor {
    pub fn new(filter: TarFilter) -> Self {
        Self {
            filter,
            cancel: CancelToken::new(),
        }
    }

    fn resolve_filter(&self, archive: &Path) -> Result<TarFilter> {
        if !archive.exists() {
            return Err(Error::FileNotFound(archive.display().to_string()));
        }

        let file = File::open(archive).map_err(|e| Error::io(e, archive.display()))?;
        let mut header = Vec::with_capacity(PROBE_LEN);
        file.take(PROBE_LEN as u64)
            .read_to_end(&mut header)
            .map_err(|e| Error::io(e, archive.display()))?;

        match sniff(&header) {
            Sniffed::Format(format) => match format.family() {
                FormatFamily::Tar(filter) => Ok(filter),
                _ => Err(Error::UnsupportedFormat(format!(
                    "{} is a {} archive, not a compressed TAR",
                    archive.display(),
                    format
                ))),
            },
            Sniffed::PlainTar => Err(Error::UnsupportedFormat(format!(
                "{} is an uncompressed TAR archive, which is not supported",
                archive.display()
            ))),
            Sniffed::Unknown => Ok(match format_from_extension(archive).map(|f| f.family()) {
                Some(FormatFamily::Tar(filter)) => filter,
                _ => self.filter,
            }),
        }
    }

    fn open(&self, archive: &Path) -> Result<TarStream> {
        let filter = self.resolve_filter(archive)?;
        debug!(?archive, ?filter, "Opening TAR stream");
        open_stream(archive, filter)
    }

    fn run(
        &self,
        archive: &Path,
        output_dir: &Path,
        options: &ExtractOptions,
        filter: MemberFilter,
        callbacks: Callbacks<'_>,
    ) -> ExtractResult {
        let mut session = match Extraction::start(
            archive,
            output_dir,
            options,
            filter,
            callbacks,
            self.cancel.clone(),
        ) {
            Ok(session) => session,
            Err(e) => return session::failed(e),
        };
        let outcome = self
            .open(archive)
            .and_then(|stream| extract_members(stream, &mut session));
        session.finish(outcome)
    }
}

fn extract_members(mut stream: TarStream, session: &mut Extraction<'_>) -> Result<()> {
    session.set_total(stream.compressed_size);
    let consumed = Rc::clone(&stream.consumed);

    for item in stream
        .archive
        .entries()
        .map_err(|e| corrupt("failed to read TAR stream", e))?
    {
        let mut item = item.map_err(|e| corrupt("failed to read TAR entry", e))?;
        if is_extension_record(item.header().entry_type()) {
            continue;
        }
        let entry = entry_from(&item)?;

        let dest = match session.plan(&entry)? {
            Target::Write(dest) => dest,
            Target::Skip => {
                session.advance(&entry.path, consumed.get());
                continue;
            }
        };

        match item.header().entry_type() {
            EntryType::Directory => session.create_dir(&dest, &entry),
            EntryType::Symlink => match entry.link_target.as_deref() {
                Some(target) => session.create_symlink(&dest, &entry, Path::new(target)),
                None => session.skip(
                    &entry.path,
                    Error::CorruptedArchive(format!("{}: symlink without target", entry.path)),
                ),
            },
            EntryType::Link => match entry.link_target.clone() {
                Some(target) => session.create_hard_link(&dest, &entry, &target),
                None => session.skip(
                    &entry.path,
                    Error::CorruptedArchive(format!("{}: hard link without target", entry.path)),
                ),
            },
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                // The stream cannot be resynchronised after a failed read
                session.write_file(&dest, &entry, &mut item)?;
            }
            other => {
                warn!(member = %entry.path, entry_type = ?other, "Unsupported TAR entry type");
                session.skip(
                    &entry.path,
                    Error::UnsupportedOperation(format!(
                        "{}: unsupported entry type {:?}",
                        entry.path, other
                    )),
                );
            }
        }

        session.advance(&entry.path, consumed.get());
    }

    Ok(())
}

impl Extractor for TarExtractor {
    fn extract(
        &self,
        archive: &Path,
        output_dir: &Path,
        options: &ExtractOptions,
        callbacks: Callbacks<'_>,
    ) -> ExtractResult {
        let filter = MemberFilter::new(&options.include_patterns, &options.exclude_patterns);
        self.run(archive, output_dir, options, filter, callbacks)
    }

    fn extract_partial(
        &self,
        archive: &Path,
        output_dir: &Path,
        patterns: &[String],
        options: &ExtractOptions,
        callbacks: Callbacks<'_>,
    ) -> ExtractResult {
        let mut filter = MemberFilter::new(&options.include_patterns, &options.exclude_patterns);
        filter.require_any(patterns);
        self.run(archive, output_dir, options, filter, callbacks)
    }

    fn list_contents(&self, archive: &Path, _password: Option<&str>) -> Result<Vec<ArchiveEntry>> {
        info!("Inspecting TAR archive: {:?}", archive);
        let mut stream = self.open(archive)?;
        let mut entries = Vec::new();
        for item in stream
            .archive
            .entries()
            .map_err(|e| corrupt("failed to read TAR stream", e))?
        {
            let item = item.map_err(|e| corrupt("failed to read TAR entry", e))?;
            if !is_extension_record(item.header().entry_type()) {
                entries.push(entry_from(&item)?);
            }
        }
        Ok(entries)
    }

    fn verify_integrity(&self, archive: &Path, _password: Option<&str>) -> Result<()> {
        info!("Verifying TAR archive: {:?}", archive);
        let stream = self.open(archive)?;
        let mut tar = stream.archive;
        let mut members = 0usize;

        for item in tar
            .entries()
            .map_err(|e| corrupt("failed to read TAR stream", e))?
        {
            self.cancel.check()?;
            let mut item = item.map_err(|e| corrupt("failed to read TAR entry", e))?;
            if is_extension_record(item.header().entry_type()) {
                continue;
            }
            let entry = entry_from(&item)?;
            let read = io::copy(&mut item, &mut io::sink()).map_err(|e| corrupt(&entry.path, e))?;
            if read != entry.uncompressed_size {
                return Err(Error::CorruptedArchive(format!(
                    "{}: expected {} bytes, read {}",
                    entry.path, entry.uncompressed_size, read
                )));
            }
            members += 1;
        }

        // Drain the rest so the compression trailer and checksum are read too
        io::copy(&mut tar.into_inner(), &mut io::sink())
            .map_err(|e| corrupt("compressed stream trailer", e))?;

        info!(members, "TAR archive verified");
        Ok(())
    }

    /// Filter from the file name, then from the content
    fn detect_format(&self, archive: &Path) -> Result<ArchiveFormat> {
        if !archive.exists() {
            return Err(Error::FileNotFound(archive.display().to_string()));
        }
        match format_from_extension(archive) {
            Some(format) if matches!(format.family(), FormatFamily::Tar(_)) => Ok(format),
            _ => self.resolve_filter(archive).map(TarFilter::format),
        }
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn supports_format(&self, format: ArchiveFormat) -> bool {
        matches!(format.family(), FormatFamily::Tar(_))
    }

    fn format_name(&self) -> &'static str {
        "tar"
    }
}

/// Tar packer
///
/// The filter comes from [`PackOptions::format`]; the filter given to
/// [`TarPacker::new`] only decides which format the packer advertises first.
#[derive(Debug)]
pub struct TarPacker {
    filter: TarFilter,
    cancel: CancelToken,
}

impl TarPacker {
    pub fn new(filter: TarFilter) -> Self {
        Self {
            filter,
            cancel: CancelToken::new(),
        }
    }

    pub fn filter(&self) -> TarFilter {
        self.filter
    }
}

impl Packer for TarPacker {
    fn pack(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &PackOptions,
        callbacks: Callbacks<'_>,
    ) -> PackResult {
        let FormatFamily::Tar(filter) = options.format().family() else {
            return packer::failed(Error::UnsupportedFormat(format!(
                "tar packer cannot write {}",
                options.format()
            )));
        };

        run_pack(inputs, output, options, callbacks, self.cancel.clone(), |members, packing| {
            info!(?filter, "Packing into TAR {:?}", output);
            let file = File::create(output).map_err(|e| Error::io(e, output.display()))?;
            write_compressed(BufWriter::new(file), filter, members, options, packing)
        })
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn supports_format(&self, format: ArchiveFormat) -> bool {
        matches!(format.family(), FormatFamily::Tar(_))
    }

    fn format_name(&self) -> &'static str {
        "tar"
    }
}

/// Write the tar stream through `filter`, finishing the encoder even when
/// writing members stopped early
fn write_compressed(
    writer: BufWriter<File>,
    filter: TarFilter,
    members: &[Member],
    options: &PackOptions,
    packing: &mut Packing<'_>,
) -> Result<()> {
    let level = options.level();
    let (written, finished) = match filter {
        TarFilter::Gzip => {
            let encoder = GzEncoder::new(writer, flate2::Compression::new(level));
            let (written, encoder) = write_tar(encoder, members, options, packing);
            (written, encoder.and_then(|e| e.finish()))
        }
        TarFilter::Xz => {
            if options.threads().is_some() {
                debug!("Thread hint ignored for xz");
            }
            let encoder = XzEncoder::new(writer, level);
            let (written, encoder) = write_tar(encoder, members, options, packing);
            (written, encoder.and_then(|e| e.finish()))
        }
        TarFilter::Zstd => {
            let mut encoder = ZstdEncoder::new(writer, level as i32)?;
            if let Some(threads) = options.threads().filter(|&t| t > 1) {
                debug!(threads, "Using multithreaded zstd");
                encoder.multithread(threads as u32)?;
            }
            let (written, encoder) = write_tar(encoder, members, options, packing);
            (written, encoder.and_then(|e| e.finish()))
        }
    };

    let flushed = finished
        .and_then(|mut inner| inner.flush())
        .map_err(|e| Error::CompressionFailure(format!("failed to finish archive: {}", e)));
    written.and(flushed)
}

fn write_tar<W: Write>(
    writer: W,
    members: &[Member],
    options: &PackOptions,
    packing: &mut Packing<'_>,
) -> (Result<()>, io::Result<W>) {
    let mut builder = Builder::new(writer);
    builder.follow_symlinks(false);
    let written = append_members(&mut builder, members, options, packing);
    (written, builder.into_inner())
}

fn member_header(member: &Member, options: &PackOptions) -> Header {
    let mut header = Header::new_gnu();
    let default_mode = if member.kind == MemberKind::Dir { 0o755 } else { 0o644 };
    let mode = match (options.permissions_preserved(), member.metadata.mode) {
        (true, Some(mode)) => mode,
        _ => default_mode,
    };
    header.set_mode(mode);

    let mtime = match (options.timestamps_preserved(), member.metadata.mtime) {
        (true, Some(mtime)) => u64::try_from(mtime).unwrap_or(0),
        _ => 0,
    };
    header.set_mtime(mtime);
    header.set_size(0);
    header
}

fn append_members<W: Write>(
    builder: &mut Builder<W>,
    members: &[Member],
    options: &PackOptions,
    packing: &mut Packing<'_>,
) -> Result<()> {
    for member in members {
        packing.next(member)?;
        let mut header = member_header(member, options);

        match &member.kind {
            MemberKind::Dir => {
                header.set_entry_type(EntryType::Directory);
                builder.append_data(&mut header, format!("{}/", member.name), io::empty())?;
                packing.done(member, 0);
            }
            MemberKind::Symlink(target) => {
                header.set_entry_type(EntryType::Symlink);
                builder.append_link(&mut header, &member.name, target)?;
                packing.done(member, 0);
            }
            MemberKind::File => {
                let source = match open_source(member) {
                    Ok(source) => source,
                    Err(e) => {
                        packing.skip(member, e);
                        continue;
                    }
                };
                let size = source
                    .metadata()
                    .map_err(|e| Error::io(e, member.source.display()))?
                    .len();
                header.set_entry_type(EntryType::Regular);
                header.set_size(size);
                builder.append_data(&mut header, &member.name, source.take(size))?;
                packing.done(member, size);
            }
        }
    }
    Ok(())
}
