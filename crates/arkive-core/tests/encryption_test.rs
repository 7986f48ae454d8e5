use arkive_core::{create_extractor, ArchiveFormat, Callbacks, Error, ExtractOptions};
use arkive_testing::TestDir;
use sevenz_rust::lzma::LZMA2Options;
use sevenz_rust::{AesEncoderOptions, Password, SevenZArchiveEntry, SevenZWriter};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::{AesMode, ZipWriter};

const PASSWORD: &str = "s3cret";
const CONTENT: &[u8] = b"launch codes: 0000\n";

fn encrypted_zip(test_dir: &TestDir) -> PathBuf {
    let archive = test_dir.join("secret.zip");
    let mut zip = ZipWriter::new(File::create(&archive).unwrap());
    let options = SimpleFileOptions::default().with_aes_encryption(AesMode::Aes256, PASSWORD);
    zip.start_file("secret.txt", options).unwrap();
    zip.write_all(CONTENT).unwrap();
    zip.finish().unwrap();
    archive
}

/// Content encrypted with AES, headers left readable
fn encrypted_7z(test_dir: &TestDir) -> PathBuf {
    let source = test_dir.create_file("src/secret.txt", CONTENT).unwrap();
    let archive = test_dir.join("secret.7z");
    let mut writer = SevenZWriter::create(&archive).unwrap();
    writer.set_content_methods(vec![
        AesEncoderOptions::new(Password::from(PASSWORD)).into(),
        LZMA2Options::with_preset(6).into(),
    ]);
    writer
        .push_archive_entry(
            SevenZArchiveEntry::from_path(&source, "secret.txt".to_string()),
            Some(File::open(&source).unwrap()),
        )
        .unwrap();
    writer.finish().unwrap();
    archive
}

fn with_password(password: Option<&str>) -> ExtractOptions {
    ExtractOptions {
        password: password.map(str::to_string),
        ..ExtractOptions::default()
    }
}

fn check_encrypted(format: ArchiveFormat, archive: &PathBuf, test_dir: &TestDir) {
    let extractor = create_extractor(format);

    let info = extractor.archive_info(archive, None).unwrap();
    assert!(info.is_encrypted, "{}", format);
    let entries = extractor.list_contents(archive, None).unwrap();
    assert!(entries.iter().any(|e| e.path == "secret.txt" && e.is_encrypted), "{}", format);

    for password in [None, Some("not-it")] {
        let output = test_dir.join("rejected");
        let result = extractor.extract(archive, &output, &with_password(password), Callbacks::new());
        assert!(!result.success, "{} {:?}", format, password);
        assert!(
            matches!(result.error, Some(Error::InvalidPassword(_))),
            "{} {:?}: {:?}",
            format,
            password,
            result.error
        );
        assert_eq!(result.files_extracted, 0);
        assert!(!output.join("secret.txt").exists());

        let verified = extractor.verify_integrity(archive, password);
        assert!(
            matches!(verified, Err(Error::InvalidPassword(_))),
            "{} {:?}: {:?}",
            format,
            password,
            verified
        );
    }

    extractor.verify_integrity(archive, Some(PASSWORD)).unwrap();
    let output = test_dir.join("accepted");
    let result = extractor.extract(archive, &output, &with_password(Some(PASSWORD)), Callbacks::new());
    assert!(result.success, "{}: {:?}", format, result.error_message);
    assert_eq!(result.files_extracted, 1);
    assert_eq!(fs::read(output.join("secret.txt")).unwrap(), CONTENT);
}

#[test]
fn test_encrypted_zip() {
    let test_dir = TestDir::new().unwrap();
    let archive = encrypted_zip(&test_dir);
    check_encrypted(ArchiveFormat::Zip, &archive, &test_dir);
}

#[test]
fn test_encrypted_7z_content() {
    let test_dir = TestDir::new().unwrap();
    let archive = encrypted_7z(&test_dir);

    // The flag comes from the folder coders, so a password is not needed
    let extractor = create_extractor(ArchiveFormat::SevenZip);
    assert!(extractor.archive_info(&archive, Some(PASSWORD)).unwrap().is_encrypted);

    check_encrypted(ArchiveFormat::SevenZip, &archive, &test_dir);
}

#[test]
fn test_plain_archives_are_not_encrypted() {
    let test_dir = TestDir::new().unwrap();
    let source = test_dir.create_file("plain/readme.txt", b"hello").unwrap();

    for format in [ArchiveFormat::Zip, ArchiveFormat::SevenZip] {
        let archive = test_dir.join(&format!("plain{}", format.extension()));
        let result = arkive_core::create_packer(format).pack(
            &[source.clone()],
            &archive,
            &arkive_core::PackOptions::new(format),
            Callbacks::new(),
        );
        assert!(result.success, "{}: {:?}", format, result.error_message);

        let info = create_extractor(format).archive_info(&archive, None).unwrap();
        assert!(!info.is_encrypted, "{}", format);
    }
}
