//! Zip archive backend

use super::extractor::Extractor;
use super::filter::MemberFilter;
use super::packer::{open_source, run_pack, Member, MemberKind, Packer, Packing};
use super::session::{self, Extraction, Target};
use crate::format::ArchiveFormat;
use crate::model::{ArchiveEntry, ExtractOptions, ExtractResult, PackOptions, PackResult};
use crate::progress::{Callbacks, CancelToken};
use crate::{Error, Result};
use chrono::{Datelike, Timelike};
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

fn open_archive(archive: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| Error::io(e, archive.display()))?;
    Ok(ZipArchive::new(file)?)
}

/// Read every member's metadata from the central directory
fn read_entries(archive: &mut ZipArchive<File>) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;
        let mode = file.unix_mode();
        let mut entry = ArchiveEntry::new(file.name(), file.is_dir())
            .with_sizes(file.compressed_size(), file.size());
        entry.modified = file.last_modified().and_then(dos_to_unix);
        entry.permissions = mode.map(|m| m & 0o7777);
        entry.crc32 = (!entry.is_directory).then(|| file.crc32());
        entry.is_encrypted = file.encrypted();
        entry.is_symlink = mode.is_some_and(|m| m & S_IFMT == S_IFLNK);
        entries.push(entry);
    }
    Ok(entries)
}

/// DOS timestamps carry no zone; they are read as UTC
fn dos_to_unix(dt: zip::DateTime) -> Option<i64> {
    let date = chrono::NaiveDate::from_ymd_opt(dt.year().into(), dt.month().into(), dt.day().into())?;
    let time = date.and_hms_opt(dt.hour().into(), dt.minute().into(), dt.second().into())?;
    Some(time.and_utc().timestamp())
}

fn unix_to_dos(secs: i64) -> Option<zip::DateTime> {
    let time = chrono::DateTime::from_timestamp(secs, 0)?;
    zip::DateTime::from_date_and_time(
        u16::try_from(time.year()).ok()?,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .ok()
}

fn password_required(member: &str) -> Error {
    Error::InvalidPassword(format!("{} is encrypted and no password was given", member))
}

/// Zip extractor
#[derive(Debug, Default)]
pub struct ZipExtractor {
    cancel: CancelToken,
}

impl ZipExtractor {
    /// Create a new zip extractor
    pub fn new() -> Self {
        Self::default()
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
        let outcome = extract_members(archive, &mut session);
        session.finish(outcome)
    }
}

fn extract_members(archive: &Path, session: &mut Extraction<'_>) -> Result<()> {
    let mut zip = open_archive(archive)?;
    let entries = read_entries(&mut zip)?;
    let password = session.password().map(str::to_owned);
    session.set_total(entries.iter().map(|e| e.uncompressed_size).sum());

    let mut processed = 0u64;
    for (index, entry) in entries.iter().enumerate() {
        processed += entry.uncompressed_size;

        let dest = match session.plan(entry)? {
            Target::Write(dest) => dest,
            Target::Skip => {
                session.advance(&entry.path, processed);
                continue;
            }
        };

        if entry.is_directory {
            session.create_dir(&dest, entry);
            session.advance(&entry.path, processed);
            continue;
        }

        let opened = match password.as_deref() {
            Some(pw) if entry.is_encrypted => zip.by_index_decrypt(index, pw.as_bytes()),
            None if entry.is_encrypted => return Err(password_required(&entry.path)),
            _ => zip.by_index(index),
        };
        let mut file = match opened.map_err(Error::from) {
            Ok(file) => file,
            Err(e @ Error::InvalidPassword(_)) => return Err(e),
            Err(e) => {
                session.skip(&entry.path, e);
                session.advance(&entry.path, processed);
                continue;
            }
        };

        if entry.is_symlink {
            let mut target = String::new();
            match file.read_to_string(&mut target) {
                Ok(_) => session.create_symlink(&dest, entry, Path::new(&target)),
                Err(e) => session.skip(&entry.path, Error::io(e, &entry.path)),
            }
        } else if let Err(e) = session.write_file(&dest, entry, &mut file) {
            // A bad member does not poison the rest of a zip
            session.report(&entry.path, &e);
        }
        drop(file);

        session.advance(&entry.path, processed);
    }

    Ok(())
}

impl Extractor for ZipExtractor {
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
        info!("Inspecting ZIP archive: {:?}", archive);
        read_entries(&mut open_archive(archive)?)
    }

    fn verify_integrity(&self, archive: &Path, password: Option<&str>) -> Result<()> {
        info!("Verifying ZIP archive: {:?}", archive);
        let mut zip = open_archive(archive)?;
        let entries = read_entries(&mut zip)?;

        for (index, entry) in entries.iter().enumerate() {
            self.cancel.check()?;
            if entry.is_directory {
                continue;
            }

            let mut file = match password {
                Some(pw) if entry.is_encrypted => zip.by_index_decrypt(index, pw.as_bytes())?,
                None if entry.is_encrypted => return Err(password_required(&entry.path)),
                _ => zip.by_index(index)?,
            };
            let read = io::copy(&mut file, &mut io::sink())
                .map_err(|e| Error::CorruptedArchive(format!("{}: {}", entry.path, e)))?;
            if read != entry.uncompressed_size {
                return Err(Error::CorruptedArchive(format!(
                    "{}: expected {} bytes, read {}",
                    entry.path, entry.uncompressed_size, read
                )));
            }
            debug!(member = %entry.path, bytes = read, "Verified");
        }

        info!(members = entries.len(), "ZIP archive verified");
        Ok(())
    }

    fn detect_format(&self, archive: &Path) -> Result<ArchiveFormat> {
        if !archive.exists() {
            return Err(Error::FileNotFound(archive.display().to_string()));
        }
        Ok(ArchiveFormat::Zip)
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn supports_format(&self, format: ArchiveFormat) -> bool {
        format == ArchiveFormat::Zip
    }

    fn format_name(&self) -> &'static str {
        "zip"
    }
}

/// Zip packer
#[derive(Debug, Default)]
pub struct ZipPacker {
    cancel: CancelToken,
}

impl ZipPacker {
    /// Create a new zip packer
    pub fn new() -> Self {
        Self::default()
    }
}

impl Packer for ZipPacker {
    fn pack(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &PackOptions,
        callbacks: Callbacks<'_>,
    ) -> PackResult {
        if !self.supports_format(options.format()) {
            return super::packer::failed(Error::UnsupportedFormat(format!(
                "zip packer cannot write {}",
                options.format()
            )));
        }

        run_pack(inputs, output, options, callbacks, self.cancel.clone(), |members, packing| {
            info!("Packing into ZIP {:?}", output);
            let file = File::create(output).map_err(|e| Error::io(e, output.display()))?;
            let mut zip = ZipWriter::new(file);
            let written = write_members(&mut zip, members, options, packing);
            let finished = zip.finish().map(drop).map_err(Error::from);
            written.and(finished)
        })
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn supports_format(&self, format: ArchiveFormat) -> bool {
        format == ArchiveFormat::Zip
    }

    fn format_name(&self) -> &'static str {
        "zip"
    }
}

fn member_options(member: &Member, options: &PackOptions) -> FileOptions<'static, ()> {
    let method = if options.level() == 0 {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    };
    let mut file_options = FileOptions::<'static, ()>::default()
        .compression_method(method)
        .large_file(member.size >= u64::from(u32::MAX));
    if method == CompressionMethod::Deflated {
        file_options = file_options.compression_level(Some(i64::from(options.level())));
    }

    let default_mode = if member.kind == MemberKind::Dir { 0o755 } else { 0o644 };
    let mode = match (options.permissions_preserved(), member.metadata.mode) {
        (true, Some(mode)) => mode,
        _ => default_mode,
    };
    file_options = file_options.unix_permissions(mode);

    if options.timestamps_preserved() {
        if let Some(time) = member.metadata.mtime.and_then(unix_to_dos) {
            file_options = file_options.last_modified_time(time);
        }
    }
    file_options
}

fn write_members<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    members: &[Member],
    options: &PackOptions,
    packing: &mut Packing<'_>,
) -> Result<()> {
    for member in members {
        packing.next(member)?;
        let file_options = member_options(member, options);

        match &member.kind {
            MemberKind::Dir => {
                zip.add_directory(format!("{}/", member.name), file_options)?;
                packing.done(member, 0);
            }
            MemberKind::Symlink(target) => {
                zip.add_symlink(
                    member.name.clone(),
                    target.to_string_lossy().into_owned(),
                    file_options,
                )?;
                packing.done(member, 0);
            }
            MemberKind::File => {
                let mut source = match open_source(member) {
                    Ok(source) => source,
                    Err(e) => {
                        packing.skip(member, e);
                        continue;
                    }
                };
                zip.start_file(member.name.clone(), file_options)?;
                let bytes = io::copy(&mut source, &mut *zip)
                    .map_err(|e| Error::io(e, member.source.display()))?;
                packing.done(member, bytes);
            }
        }
    }
    Ok(())
}
