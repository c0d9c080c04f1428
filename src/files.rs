//! On-disk file schema (`spec.md` §6, `SPEC_FULL.md` §6 "File format
//! versioning"): a versioned header wrapper plus atomic write-then-rename,
//! mirroring the teacher's `storage::persist` durability model.

use std::fs;
use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors produced while reading or writing a record/DB/rule file.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// The underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// `bincode` could not decode the payload.
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    /// `serde_json` could not decode the payload.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The file's magic bytes did not match the expected format.
    #[error("bad magic: expected {expected:?}, got {actual:?}")]
    BadMagic {
        /// The magic bytes this reader expects.
        expected: [u8; 4],
        /// The magic bytes actually present in the file.
        actual: [u8; 4],
    },
    /// The file declares a version newer than this reader understands.
    #[error("unsupported version: {version} (reader supports up to {max_supported})")]
    UnsupportedVersion {
        /// The version found in the file.
        version: u16,
        /// The highest version this reader supports.
        max_supported: u16,
    },
}

/// The 4-byte magic + 2-byte version prefix written ahead of every on-disk
/// payload (`SPEC_FULL.md` §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileHeader {
    magic: [u8; 4],
    version: u16,
}

impl FileHeader {
    /// The current on-disk format version for all file kinds in this
    /// crate. Bumped whenever a payload shape changes incompatibly.
    pub const CURRENT_VERSION: u16 = 1;

    /// Build a header with the crate's current version.
    #[must_use]
    pub fn new(magic: [u8; 4]) -> Self {
        FileHeader {
            magic,
            version: Self::CURRENT_VERSION,
        }
    }

    fn validate(self, expected_magic: [u8; 4]) -> Result<(), FileError> {
        if self.magic != expected_magic {
            return Err(FileError::BadMagic {
                expected: expected_magic,
                actual: self.magic,
            });
        }
        if self.version > Self::CURRENT_VERSION {
            return Err(FileError::UnsupportedVersion {
                version: self.version,
                max_supported: Self::CURRENT_VERSION,
            });
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    header: FileHeader,
    payload: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeOwned<T> {
    header: FileHeader,
    payload: T,
}

/// Write `value` to `path` as a bincode-encoded, header-wrapped payload,
/// via a write-to-temp-then-rename so a crashed writer leaves no partial
/// file visible (`spec.md` §5).
pub fn write_bincode_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), FileError> {
    write_bincode_atomic_magic(path, *b"AIF\0", value)
}

/// As [`write_bincode_atomic`], with an explicit magic tag for the file
/// kind (record/DB/rule/cache files each use a distinct tag so a reader
/// can catch a misrouted file early).
pub fn write_bincode_atomic_magic<T: Serialize>(
    path: &Path,
    magic: [u8; 4],
    value: &T,
) -> Result<(), FileError> {
    let envelope = EnvelopeRef {
        header: FileHeader::new(magic),
        payload: value,
    };
    let bytes = bincode::serialize(&envelope)?;
    atomic_write(path, &bytes)
}

/// Read and validate a bincode-encoded, header-wrapped payload written by
/// [`write_bincode_atomic`].
pub fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T, FileError> {
    read_bincode_magic(path, *b"AIF\0")
}

/// As [`read_bincode`], validating an explicit magic tag.
pub fn read_bincode_magic<T: DeserializeOwned>(
    path: &Path,
    magic: [u8; 4],
) -> Result<T, FileError> {
    let bytes = fs::read(path)?;
    let envelope: EnvelopeOwned<T> = bincode::deserialize(&bytes)?;
    envelope.header.validate(magic)?;
    Ok(envelope.payload)
}

/// Write `value` to `path` as pretty-printed, header-wrapped JSON (used
/// for the human-readable rule/validity files in `spec.md` §6), via
/// atomic write-then-rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, magic: [u8; 4], value: &T) -> Result<(), FileError> {
    let envelope = EnvelopeRef {
        header: FileHeader::new(magic),
        payload: value,
    };
    let text = serde_json::to_vec_pretty(&envelope)?;
    atomic_write(path, &text)
}

/// Read and validate a header-wrapped JSON payload written by
/// [`write_json_atomic`].
pub fn read_json<T: DeserializeOwned>(path: &Path, magic: [u8; 4]) -> Result<T, FileError> {
    let bytes = fs::read(path)?;
    let envelope: EnvelopeOwned<T> = serde_json::from_slice(&bytes)?;
    envelope.header.validate(magic)?;
    Ok(envelope.payload)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("out")
    ));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
