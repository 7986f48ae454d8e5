use arkive_core::{create_extractor, create_extractor_auto, create_packer, detect_format};
use arkive_core::{ArchiveFormat, Callbacks, Error, ExtractOptions, PackOptions};
use arkive_testing::helpers::{flip_byte, truncate_half};
use arkive_testing::{fixtures, TestDir};
use std::fs;

fn packed(test_dir: &TestDir, format: ArchiveFormat, name: &str) -> std::path::PathBuf {
    let tree = fixtures::create_project_tree(test_dir, "project").unwrap();
    let archive = test_dir.join(name);
    let result = create_packer(format).pack(&[tree], &archive, &PackOptions::new(format), Callbacks::new());
    assert!(result.success, "{:?}", result.error_message);
    archive
}

#[test]
fn test_content_wins_over_extension() {
    let test_dir = TestDir::new().unwrap();
    let archive = packed(&test_dir, ArchiveFormat::TarXz, "really-xz.zip");

    assert_eq!(detect_format(&archive).unwrap(), ArchiveFormat::TarXz);
    let extractor = create_extractor_auto(&archive).unwrap();
    assert!(extractor.supports_format(ArchiveFormat::TarXz));
    assert!(extractor.list_contents(&archive, None).is_ok());
}

#[test]
fn test_every_format_is_sniffed() {
    for &format in ArchiveFormat::all() {
        let test_dir = TestDir::new().unwrap();
        let archive = packed(&test_dir, format, "archive.bin");
        assert_eq!(detect_format(&archive).unwrap(), format);
    }
}

#[test]
fn test_plain_tar_rejected() {
    let test_dir = TestDir::new().unwrap();
    let archive = test_dir.join("plain.tar");
    let mut builder = tar::Builder::new(fs::File::create(&archive).unwrap());
    let mut header = tar::Header::new_ustar();
    header.set_path("hello.txt").unwrap();
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, "hello".as_bytes()).unwrap();
    builder.finish().unwrap();
    drop(builder);

    assert!(matches!(detect_format(&archive), Err(Error::UnsupportedFormat(_))));
    assert!(create_extractor_auto(&archive).is_err());
}

#[test]
fn test_empty_and_unknown_files() {
    let test_dir = TestDir::new().unwrap();
    let empty = test_dir.create_file("empty.zip", b"").unwrap();
    let text = test_dir.create_file("notes.txt", b"just some text, not an archive").unwrap();

    assert!(matches!(detect_format(&empty), Err(Error::CorruptedArchive(_))));
    assert!(matches!(detect_format(&text), Err(Error::UnsupportedFormat(_))));
    assert!(matches!(
        detect_format(&test_dir.join("absent.7z")),
        Err(Error::FileNotFound(_))
    ));
}

#[test]
fn test_truncated_archives_fail_verification() {
    for &format in ArchiveFormat::all() {
        let test_dir = TestDir::new().unwrap();
        let archive = packed(&test_dir, format, &format!("cut{}", format.extension()));
        truncate_half(&archive).unwrap();

        let extractor = create_extractor(format);
        let outcome = extractor
            .list_contents(&archive, None)
            .and_then(|_| extractor.verify_integrity(&archive, None));
        assert!(outcome.is_err(), "{}", format);
    }
}

#[test]
fn test_flipped_byte_in_tar_stream_detected() {
    let test_dir = TestDir::new().unwrap();
    let archive = packed(&test_dir, ArchiveFormat::TarGz, "flip.tar.gz");
    let len = fs::metadata(&archive).unwrap().len() as usize;
    flip_byte(&archive, len / 2).unwrap();

    let extractor = create_extractor(ArchiveFormat::TarGz);
    let result = extractor.extract(
        &archive,
        &test_dir.join("out"),
        &ExtractOptions::default(),
        Callbacks::new(),
    );
    assert!(!result.success || extractor.verify_integrity(&archive, None).is_err());
}

#[test]
fn test_bare_signatures_are_detected() {
    let signatures: &[(&[u8], ArchiveFormat)] = &[
        (&[0x50, 0x4B, 0x03, 0x04], ArchiveFormat::Zip),
        (&[0x50, 0x4B, 0x05, 0x06], ArchiveFormat::Zip),
        (&[0x50, 0x4B, 0x07, 0x08], ArchiveFormat::Zip),
        (&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C], ArchiveFormat::SevenZip),
        (&[0x1F, 0x8B], ArchiveFormat::TarGz),
        (&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00], ArchiveFormat::TarXz),
        (&[0x28, 0xB5, 0x2F, 0xFD], ArchiveFormat::TarZstd),
    ];

    let test_dir = TestDir::new().unwrap();
    for (index, (magic, format)) in signatures.iter().enumerate() {
        let path = test_dir.create_file(&format!("magic-{}.txt", index), magic).unwrap();
        assert_eq!(detect_format(&path).unwrap(), *format, "{:02X?}", magic);
    }
}

#[test]
fn test_single_byte_file_is_corrupted() {
    let test_dir = TestDir::new().unwrap();
    let path = test_dir.create_file("tiny.zip", &[0x50]).unwrap();

    assert!(matches!(detect_format(&path), Err(Error::CorruptedArchive(_))));
}
