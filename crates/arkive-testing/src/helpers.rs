//! Helpers for damaging archives in corruption tests

use anyhow::{ensure, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Cuts `path` down to its first `keep` bytes
pub fn truncate_file(path: &Path, keep: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep)?;
    Ok(())
}

/// Cuts `path` in half
pub fn truncate_half(path: &Path) -> Result<()> {
    let len = fs::metadata(path)?.len();
    truncate_file(path, len / 2)
}

/// Inverts every bit of the byte at `offset`
pub fn flip_byte(path: &Path, offset: usize) -> Result<()> {
    let mut data = fs::read(path)?;
    ensure!(offset < data.len(), "offset {} beyond {} bytes", offset, data.len());
    data[offset] ^= 0xFF;
    fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestDir;

    #[test]
    fn test_damage_helpers() {
        let test_dir = TestDir::new().unwrap();
        let path = test_dir.create_file("f.bin", &[1, 2, 3, 4]).unwrap();

        flip_byte(&path, 1).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 0xFD, 3, 4]);

        truncate_half(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 0xFD]);

        assert!(flip_byte(&path, 10).is_err());
    }
}
