//! Firmware image preparation.
//!
//! `flashrom` writes the whole chip, so an image shorter than the flash is
//! extended to the full chip size. The tail is filled with the erased value
//! (`0xFF`), which is what the flash reads back after a sector erase anyway.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Capacity of the W25Q80 SPI flash on HDZero boards, in bytes.
pub const FLASH_SIZE: usize = 1024 * 1024;

/// Value of an erased flash byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Largest firmware accepted when picking a local file.
///
/// HDZero firmware binaries are 64 KiB at most. Images obtained from the
/// catalog are only checked against [`FLASH_SIZE`].
pub const HDZERO_MAX: u64 = 64 * 1024;

/// Errors while reading, checking or padding a firmware image.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum ImageError {
    /// The firmware is {size} bytes, which exceeds the limit of {capacity} bytes.
    TooLarge {
        /// Size of the rejected firmware.
        size: u64,
        /// The limit it was checked against.
        capacity: u64,
    },

    /// {path:?} is not a .bin file.
    NotABinFile {
        /// The rejected path.
        path: PathBuf,
    },

    /// Failed to read the firmware file {path:?}.
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Failed to write the padded image.
    Write(#[source] io::Error),
}

/// A firmware image padded to the full flash size and stored in a temporary file.
///
/// The file is kept on disk after the operation; cleaning it up is left to the
/// operating system's temporary directory handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedImage {
    path: PathBuf,
    firmware_len: usize,
}

impl PaddedImage {
    /// Location of the padded image.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the original firmware at the start of the image.
    pub fn firmware_len(&self) -> usize {
        self.firmware_len
    }
}

/// Extends `firmware` to `capacity` bytes, filling the tail with [`ERASED_BYTE`].
pub fn pad_image(firmware: &[u8], capacity: usize) -> Result<Vec<u8>, ImageError> {
    if firmware.len() > capacity {
        return Err(ImageError::TooLarge {
            size: firmware.len() as u64,
            capacity: capacity as u64,
        });
    }

    let mut image = vec![ERASED_BYTE; capacity];
    image[..firmware.len()].copy_from_slice(firmware);

    Ok(image)
}

/// Reads the firmware at `path` and writes a [`FLASH_SIZE`] image to a new
/// file in the system temporary directory.
pub fn prepare_padded_image(path: impl AsRef<Path>) -> Result<PaddedImage, ImageError> {
    prepare_padded_image_in(path, std::env::temp_dir())
}

/// Like [`prepare_padded_image`], but creates the temporary file in `dir`.
///
/// The size check happens before the temporary file is created, and a file
/// that fails to be written completely is removed again, so a rejected image
/// never leaves anything behind in `dir`.
pub fn prepare_padded_image_in(
    path: impl AsRef<Path>,
    dir: impl AsRef<Path>,
) -> Result<PaddedImage, ImageError> {
    let path = path.as_ref();
    let read_error = |source: io::Error| ImageError::Read {
        path: path.to_path_buf(),
        source,
    };

    let size = fs::metadata(path).map_err(read_error)?.len();
    if size > FLASH_SIZE as u64 {
        return Err(ImageError::TooLarge {
            size,
            capacity: FLASH_SIZE as u64,
        });
    }

    let firmware = fs::read(path).map_err(read_error)?;
    let image = pad_image(&firmware, FLASH_SIZE)?;

    let mut file = tempfile::Builder::new()
        .prefix("hdzero_")
        .suffix(".bin")
        .tempfile_in(dir)
        .map_err(ImageError::Write)?;
    file.write_all(&image).map_err(ImageError::Write)?;
    file.flush().map_err(ImageError::Write)?;

    let (_, padded_path) = file.keep().map_err(|error| ImageError::Write(error.error))?;

    tracing::debug!(
        "Padded {} byte firmware {:?} to {:?}",
        firmware.len(),
        path,
        padded_path
    );

    Ok(PaddedImage {
        path: padded_path,
        firmware_len: firmware.len(),
    })
}

/// Checks a locally picked firmware file: it must have a `.bin` extension and
/// be no larger than [`HDZERO_MAX`]. Returns the file size.
pub fn validate_local_firmware(path: impl AsRef<Path>) -> Result<u64, ImageError> {
    let path = path.as_ref();

    let is_bin = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("bin"));
    if !is_bin {
        return Err(ImageError::NotABinFile {
            path: path.to_path_buf(),
        });
    }

    let size = fs::metadata(path)
        .map_err(|source| ImageError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    if size > HDZERO_MAX {
        return Err(ImageError::TooLarge {
            size,
            capacity: HDZERO_MAX,
        });
    }

    Ok(size)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test_case(0; "empty firmware")]
    #[test_case(1; "single byte")]
    #[test_case(65_536; "hdzero sized firmware")]
    #[test_case(FLASH_SIZE - 1; "one byte short")]
    #[test_case(FLASH_SIZE; "exactly flash sized")]
    fn padding_fills_the_tail_with_erased_bytes(len: usize) {
        let firmware: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

        let image = pad_image(&firmware, FLASH_SIZE).unwrap();

        assert_eq!(image.len(), FLASH_SIZE);
        assert_eq!(&image[..len], &firmware[..]);
        assert!(image[len..].iter().all(|&byte| byte == ERASED_BYTE));
    }

    #[test]
    fn padding_rejects_oversized_firmware() {
        let firmware = vec![0u8; FLASH_SIZE + 1];

        let error = pad_image(&firmware, FLASH_SIZE).unwrap_err();

        assert!(matches!(
            error,
            ImageError::TooLarge {
                size,
                capacity
            } if size == FLASH_SIZE as u64 + 1 && capacity == FLASH_SIZE as u64
        ));
    }

    #[test]
    fn zeroed_64k_firmware_round_trip() {
        let scratch = tempfile::tempdir().unwrap();
        let firmware_path = scratch.path().join("zeros.bin");
        fs::write(&firmware_path, vec![0u8; 65_536]).unwrap();

        let padded = prepare_padded_image_in(&firmware_path, scratch.path()).unwrap();
        let written = fs::read(padded.path()).unwrap();

        assert_eq!(written.len(), 1_048_576);
        assert_eq!(padded.firmware_len(), 65_536);
        assert!(written[..65_536].iter().all(|&byte| byte == 0));
        assert_eq!(
            written[65_536..]
                .iter()
                .filter(|&&byte| byte == ERASED_BYTE)
                .count(),
            1_048_576 - 65_536
        );
    }

    #[test]
    fn padded_image_file_name() {
        let scratch = tempfile::tempdir().unwrap();
        let firmware_path = scratch.path().join("fw.bin");
        fs::write(&firmware_path, b"HDZ").unwrap();

        let padded = prepare_padded_image_in(&firmware_path, scratch.path()).unwrap();
        let name = padded.path().file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("hdzero_"));
        assert!(name.ends_with(".bin"));
    }

    #[test]
    fn oversized_firmware_leaves_no_temporary_file() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let firmware_path = source.path().join("huge.bin");
        fs::write(&firmware_path, vec![0xAAu8; FLASH_SIZE + 10]).unwrap();

        let error = prepare_padded_image_in(&firmware_path, target.path()).unwrap_err();

        assert!(matches!(error, ImageError::TooLarge { .. }));
        assert_eq!(fs::read_dir(target.path()).unwrap().count(), 0);
    }

    #[test]
    fn oversized_firmware_is_rejected_by_its_size_on_disk() {
        let scratch = tempfile::tempdir().unwrap();
        let firmware_path = scratch.path().join("sparse.bin");
        // Sparse, so nothing close to this is ever allocated on disk or in memory.
        let huge = 64 * 1024 * 1024 * 1024;
        fs::File::create(&firmware_path)
            .unwrap()
            .set_len(huge)
            .unwrap();

        let error = prepare_padded_image_in(&firmware_path, scratch.path()).unwrap_err();

        assert!(matches!(
            error,
            ImageError::TooLarge { size, capacity } if size == huge && capacity == FLASH_SIZE as u64
        ));
    }

    #[test]
    fn missing_firmware_is_a_read_error() {
        let scratch = tempfile::tempdir().unwrap();

        let error =
            prepare_padded_image_in(scratch.path().join("nope.bin"), scratch.path()).unwrap_err();

        assert!(matches!(error, ImageError::Read { .. }));
    }

    #[test_case("firmware.bin", 1024 => matches Ok(1024); "small bin")]
    #[test_case("FIRMWARE.BIN", 10 => matches Ok(10); "uppercase extension")]
    #[test_case("firmware.bin", 65_536 => matches Ok(65_536); "exactly at the limit")]
    #[test_case("firmware.bin", 65_537 => matches Err(ImageError::TooLarge { .. }); "over the limit")]
    #[test_case("firmware.hex", 16 => matches Err(ImageError::NotABinFile { .. }); "wrong extension")]
    #[test_case("firmware", 16 => matches Err(ImageError::NotABinFile { .. }); "no extension")]
    fn local_firmware_selection(name: &str, size: usize) -> Result<u64, ImageError> {
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join(name);
        fs::write(&path, vec![0u8; size]).unwrap();

        validate_local_firmware(&path)
    }
}
