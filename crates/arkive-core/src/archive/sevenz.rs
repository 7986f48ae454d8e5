//! 7z archive backend

use super::extractor::Extractor;
use super::filter::MemberFilter;
use super::packer::{self, open_source, run_pack, Member, MemberKind, Packer, Packing};
use super::session::{self, Extraction, Target};
use crate::format::ArchiveFormat;
use crate::metadata::system_time_to_unix;
use crate::model::{ArchiveEntry, ExtractOptions, ExtractResult, PackOptions, PackResult};
use crate::progress::{Callbacks, CancelToken};
use crate::{Error, Result};
use sevenz_rust::lzma::LZMA2Options;
use sevenz_rust::{Archive, Password, SevenZArchiveEntry, SevenZMethod, SevenZReader, SevenZWriter};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Windows attribute flag marking Unix mode bits in the high 16 bits
const UNIX_EXTENSION: u32 = 0x8000;
const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;

fn open_reader(archive: &Path, password: Option<&str>) -> Result<SevenZReader<File>> {
    if !archive.exists() {
        return Err(Error::FileNotFound(archive.display().to_string()));
    }
    let password = match password {
        Some(p) => Password::from(p),
        None => Password::empty(),
    };
    Ok(SevenZReader::open(archive, password)?)
}

/// Per-file flag: does the file's folder run through an AES coder
///
/// Encrypted headers never get this far; opening them without the password
/// already fails with [`Error::InvalidPassword`].
fn encrypted_files(archive: &Archive) -> Vec<bool> {
    let folders: Vec<bool> = archive
        .folders
        .iter()
        .map(|folder| {
            folder
                .coders
                .iter()
                .any(|coder| coder.decompression_method_id() == SevenZMethod::ID_AES256SHA256)
        })
        .collect();

    archive
        .stream_map
        .file_folder_index
        .iter()
        .map(|index| index.and_then(|i| folders.get(i).copied()).unwrap_or(false))
        .collect()
}

/// AES carries no password check, so with encrypted content a wrong key
/// surfaces as corrupt data, and without it a password cannot be the cause
fn password_or_corruption(err: Error, encrypted: bool) -> Error {
    match err {
        Error::InvalidPassword(msg) | Error::CorruptedArchive(msg) if encrypted => {
            Error::InvalidPassword(msg)
        }
        Error::InvalidPassword(msg) => Error::CorruptedArchive(msg),
        other => other,
    }
}

/// Reader that fails when the member ends before its declared size
struct SizedReader<'a> {
    inner: &'a mut dyn Read,
    remaining: u64,
}

impl Read for SizedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() && self.remaining > 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("member ended {} bytes early", self.remaining),
            ));
        }
        self.remaining = self.remaining.saturating_sub(n as u64);
        Ok(n)
    }
}

fn unix_mode(file: &SevenZArchiveEntry) -> Option<u32> {
    let attributes = file.windows_attributes;
    (file.has_windows_attributes && attributes & UNIX_EXTENSION != 0)
        .then(|| (attributes >> 16) & 0o7777)
}

fn entry_from(file: &SevenZArchiveEntry, encrypted: bool) -> ArchiveEntry {
    let mut entry = ArchiveEntry::new(file.name(), file.is_directory())
        .with_sizes(file.compressed_size, file.size());
    entry.modified = file
        .has_last_modified_date
        .then(|| system_time_to_unix(file.last_modified_date().into()));
    entry.permissions = unix_mode(file);
    entry.crc32 = (file.has_crc && !file.is_directory()).then(|| file.crc as u32);
    entry.is_encrypted = encrypted && !file.is_directory();
    entry
}

/// 7z extractor
#[derive(Debug, Default)]
pub struct SevenZExtractor {
    cancel: CancelToken,
}

impl SevenZExtractor {
    /// Create a new 7z extractor
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
    let mut reader = open_reader(archive, session.password())?;
    let total = reader
        .archive()
        .files
        .iter()
        .filter(|f| !f.is_directory())
        .map(|f| f.size())
        .sum();
    session.set_total(total);
    // Entries arrive folder by folder, not in header order
    let mut encrypted: HashMap<String, bool> = HashMap::new();
    for (file, flag) in reader.archive().files.iter().zip(encrypted_files(reader.archive())) {
        *encrypted.entry(file.name().to_string()).or_default() |= flag;
    }
    let any_encrypted = encrypted.values().any(|&flag| flag);

    let mut processed = 0u64;
    let mut failure = None;
    let walked = reader.for_each_entries(|file, data| {
        let is_encrypted = encrypted.get(file.name()).copied().unwrap_or(false);
        let entry = entry_from(file, is_encrypted);
        processed += entry.uncompressed_size;
        match extract_one(session, &entry, data) {
            Ok(()) => {
                session.advance(&entry.path, processed);
                Ok(true)
            }
            Err(e) => {
                failure = Some(password_or_corruption(e, entry.is_encrypted));
                Ok(false)
            }
        }
    });

    match (walked, failure) {
        (Err(e), _) => Err(password_or_corruption(Error::from(e), any_encrypted)),
        (Ok(()), Some(e)) => Err(e),
        (Ok(()), None) => Ok(()),
    }
}

/// Members share solid blocks, so a failed read ends the extraction
fn extract_one(session: &mut Extraction<'_>, entry: &ArchiveEntry, data: &mut dyn Read) -> Result<()> {
    match session.plan(entry)? {
        Target::Skip => {
            io::copy(data, &mut io::sink())
                .map_err(|e| Error::CorruptedArchive(format!("{}: {}", entry.path, e)))?;
            Ok(())
        }
        Target::Write(dest) if entry.is_directory => {
            session.create_dir(&dest, entry);
            Ok(())
        }
        Target::Write(dest) => session.write_file(
            &dest,
            entry,
            &mut SizedReader {
                inner: data,
                remaining: entry.uncompressed_size,
            },
        ),
    }
}

impl Extractor for SevenZExtractor {
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

    fn list_contents(&self, archive: &Path, password: Option<&str>) -> Result<Vec<ArchiveEntry>> {
        info!("Inspecting 7z archive: {:?}", archive);
        let reader = open_reader(archive, password)?;
        let encrypted = encrypted_files(reader.archive());
        Ok(reader
            .archive()
            .files
            .iter()
            .zip(encrypted.into_iter().chain(std::iter::repeat(false)))
            .map(|(file, encrypted)| entry_from(file, encrypted))
            .collect())
    }

    fn verify_integrity(&self, archive: &Path, password: Option<&str>) -> Result<()> {
        info!("Verifying 7z archive: {:?}", archive);
        let mut reader = open_reader(archive, password)?;
        let encrypted = encrypted_files(reader.archive()).contains(&true);
        let mut current = String::new();
        let mut failure = None;
        let mut members = 0usize;

        let walked = reader.for_each_entries(|file, data| {
            current = file.name().to_string();
            if let Err(e) = self.cancel.check() {
                failure = Some(e);
                return Ok(false);
            }
            let read = io::copy(data, &mut io::sink())?;
            if read != file.size() {
                failure = Some(Error::CorruptedArchive(format!(
                    "{}: expected {} bytes, read {}",
                    current,
                    file.size(),
                    read
                )));
                return Ok(false);
            }
            members += 1;
            Ok(true)
        });

        if let Err(e) = walked {
            let err = match Error::from(e) {
                Error::InvalidPassword(msg) => Error::InvalidPassword(msg),
                other => Error::CorruptedArchive(format!("{}: {}", current, other)),
            };
            return Err(password_or_corruption(err, encrypted));
        }
        if let Some(e) = failure {
            return Err(password_or_corruption(e, encrypted));
        }

        info!(members, "7z archive verified");
        Ok(())
    }

    fn detect_format(&self, archive: &Path) -> Result<ArchiveFormat> {
        if !archive.exists() {
            return Err(Error::FileNotFound(archive.display().to_string()));
        }
        Ok(ArchiveFormat::SevenZip)
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn supports_format(&self, format: ArchiveFormat) -> bool {
        format == ArchiveFormat::SevenZip
    }

    fn format_name(&self) -> &'static str {
        "7z"
    }
}

/// 7z packer (LZMA2)
#[derive(Debug, Default)]
pub struct SevenZPacker {
    cancel: CancelToken,
}

impl SevenZPacker {
    /// Create a new 7z packer
    pub fn new() -> Self {
        Self::default()
    }
}

impl Packer for SevenZPacker {
    fn pack(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &PackOptions,
        callbacks: Callbacks<'_>,
    ) -> PackResult {
        if !self.supports_format(options.format()) {
            return packer::failed(Error::UnsupportedFormat(format!(
                "7z packer cannot write {}",
                options.format()
            )));
        }

        run_pack(inputs, output, options, callbacks, self.cancel.clone(), |members, packing| {
            info!("Packing into 7z {:?}", output);
            let mut writer = SevenZWriter::create(output)?;
            writer.set_content_methods(vec![LZMA2Options::with_preset(options.level()).into()]);
            let written = write_members(&mut writer, members, options, packing);
            let finished = writer.finish().map(drop).map_err(Error::from);
            written.and(finished)
        })
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn supports_format(&self, format: ArchiveFormat) -> bool {
        format == ArchiveFormat::SevenZip
    }

    fn format_name(&self) -> &'static str {
        "7z"
    }
}

fn archive_entry(member: &Member, options: &PackOptions) -> SevenZArchiveEntry {
    let mut entry = SevenZArchiveEntry::from_path(&member.source, member.name.clone());
    if !options.timestamps_preserved() {
        entry.has_last_modified_date = false;
    }
    if let (true, Some(mode)) = (options.permissions_preserved(), member.metadata.mode) {
        let mut attributes = UNIX_EXTENSION | (mode << 16);
        if member.kind == MemberKind::Dir {
            attributes |= FILE_ATTRIBUTE_DIRECTORY;
        }
        entry.has_windows_attributes = true;
        entry.windows_attributes = attributes;
    }
    entry
}

fn write_members(
    writer: &mut SevenZWriter<File>,
    members: &[Member],
    options: &PackOptions,
    packing: &mut Packing<'_>,
) -> Result<()> {
    for member in members {
        packing.next(member)?;
        match &member.kind {
            MemberKind::Dir => {
                writer.push_archive_entry::<&[u8]>(archive_entry(member, options), None)?;
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
                writer.push_archive_entry(archive_entry(member, options), Some(source))?;
                packing.done(member, member.size);
            }
            MemberKind::Symlink(target) => {
                debug!(member = %member.name, ?target, "Symlink not stored");
                packing.skip(
                    member,
                    Error::UnsupportedOperation(format!(
                        "{}: symlinks are not stored in 7z archives",
                        member.name
                    )),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pack_list_extract() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("docs");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("one.txt"), b"first").unwrap();
        fs::write(dir.join("sub/two.txt"), b"second").unwrap();
        let archive = temp_dir.path().join("docs.7z");

        let result = SevenZPacker::new().pack(
            &[dir],
            &archive,
            &PackOptions::new(ArchiveFormat::SevenZip),
            Callbacks::new(),
        );
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.files_processed, 2);

        let extractor = SevenZExtractor::new();
        let entries = extractor.list_contents(&archive, None).unwrap();
        let files: Vec<_> = entries.iter().filter(|e| !e.is_directory).collect();
        assert_eq!(files.len(), 2);
        assert!(entries.iter().any(|e| e.path == "docs/sub/two.txt" && e.uncompressed_size == 6));
        assert!(entries.iter().all(|e| !e.is_encrypted));

        extractor.verify_integrity(&archive, None).unwrap();

        let out = temp_dir.path().join("out");
        let result = extractor.extract(&archive, &out, &ExtractOptions::default(), Callbacks::new());
        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.files_extracted, 2);
        assert_eq!(fs::read(out.join("docs/sub/two.txt")).unwrap(), b"second");
    }

    #[test]
    fn test_short_member_is_an_error() {
        let mut data: &[u8] = b"abc";
        let mut reader = SizedReader {
            inner: &mut data,
            remaining: 5,
        };
        let mut out = Vec::new();
        let err = io::copy(&mut reader, &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_password_errors_only_for_encrypted_content() {
        let bad = || Error::InvalidPassword("bad block".to_string());
        assert!(matches!(password_or_corruption(bad(), true), Error::InvalidPassword(_)));
        assert!(matches!(password_or_corruption(bad(), false), Error::CorruptedArchive(_)));
        assert!(matches!(
            password_or_corruption(Error::CorruptedArchive("crc".into()), true),
            Error::InvalidPassword(_)
        ));
        assert!(matches!(
            password_or_corruption(Error::OperationCancelled, true),
            Error::OperationCancelled
        ));
    }

    #[test]
    fn test_garbage_is_corrupted() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("bad.7z");
        fs::write(&archive, b"7z\xBC\xAF\x27\x1C\x00\x04garbage").unwrap();

        assert!(SevenZExtractor::new().list_contents(&archive, None).is_err());
    }
}
