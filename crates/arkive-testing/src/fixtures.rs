//! Common test fixtures for archive tests

use crate::TestDir;
use anyhow::Result;
use std::path::PathBuf;

/// Creates a small project tree under `root` and returns its path
///
/// ```text
/// root/
///   README.md
///   notes.txt
///   data/blob.bin      (64 KiB, poorly compressible)
///   src/main.rs
///   src/modules/mod.rs
///   empty/
/// ```
pub fn create_project_tree(test_dir: &TestDir, root: &str) -> Result<PathBuf> {
    test_dir.create_file(&format!("{}/README.md", root), b"# Test Archive\n\nThis is a test archive.\n")?;
    test_dir.create_file(&format!("{}/notes.txt", root), "line\n".repeat(200).as_bytes())?;
    test_dir.create_file(&format!("{}/data/blob.bin", root), &pseudo_random_bytes(64 * 1024, 7))?;
    test_dir.create_file(&format!("{}/src/main.rs", root), b"fn main() {}\n")?;
    test_dir.create_file(&format!("{}/src/modules/mod.rs", root), b"pub mod utils;\n")?;
    test_dir.create_dir(&format!("{}/empty", root))?;
    Ok(test_dir.join(root))
}

/// Creates `count` small files directly under `root`
pub fn create_many_files(test_dir: &TestDir, root: &str, count: usize) -> Result<PathBuf> {
    for i in 0..count {
        test_dir.create_file(
            &format!("{}/file_{:03}.txt", root, i),
            format!("content of file {}\n", i).as_bytes(),
        )?;
    }
    Ok(test_dir.join(root))
}

/// Creates a tree containing a relative symlink (Unix only)
#[cfg(unix)]
pub fn create_symlink_tree(test_dir: &TestDir, root: &str) -> Result<PathBuf> {
    test_dir.create_file(&format!("{}/target.txt", root), b"Original file")?;
    test_dir.create_symlink(&format!("{}/link.txt", root), "target.txt")?;
    Ok(test_dir.join(root))
}

/// Deterministic bytes that compress poorly
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}
