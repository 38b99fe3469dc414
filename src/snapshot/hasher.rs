//! Content hashing for regular files.

use std::fmt;
use std::io::{self, Read};

/// Opaque content digest.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HashCode(Box<[u8]>);

impl HashCode {
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        use fmt::Write;

        self.0.iter().fold(String::with_capacity(self.0.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }
}

impl fmt::Debug for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashCode({})", self.to_hex())
    }
}

impl fmt::Display for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes a digest over a file's bytes.
///
/// The store never interprets the digest; it only compares snapshots.
pub trait FileHasher: Send + Sync + fmt::Debug {
    /// Hash everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading.
    fn hash(&self, reader: &mut dyn Read) -> io::Result<HashCode>;
}

/// BLAKE3 content hasher.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl FileHasher for Blake3Hasher {
    fn hash(&self, reader: &mut dyn Read) -> io::Result<HashCode> {
        let mut hasher = blake3::Hasher::new();
        io::copy(reader, &mut hasher)?;
        Ok(HashCode::from_bytes(hasher.finalize().as_bytes()))
    }
}
