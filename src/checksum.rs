//! The checksum primitive spec.md treats as an external collaborator.
//!
//! Concretely backed by SHA-256 (`sha2`), which is already part of the
//! teacher's dependency stack. `Checksum` is a fixed-width opaque byte
//! string exactly as spec.md §3 describes, with the `BAD` sentinel marking
//! "unknown" and [`Checksum::is_valid`] standing in for `csum_valid`.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};

pub const LEN: usize = 32;

/// A fixed-width digest. Two checksums are equal iff bytewise equal; hashing
/// for checksum-keyed tables reuses the leading machine word directly, since
/// a cryptographic digest's high bits are already uniformly random.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Checksum([u8; LEN]);

/// The "unknown checksum" sentinel: all-zero, which SHA-256 never produces
/// for a non-empty input in practice and which this crate never emits as a
/// real digest.
pub const BAD_CHECKSUM: Checksum = Checksum([0; LEN]);

impl Checksum {
    pub fn from_bytes(bytes: [u8; LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; LEN] {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != BAD_CHECKSUM
    }

    /// Hash for checksum-keyed tables: the leading 8 bytes as a native u64.
    pub fn fast_hash(&self) -> u64 {
        u64::from_le_bytes(self.0[..8].try_into().unwrap())
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        let bytes = hex::decode(s).map_err(|_| ParseError)?;
        let bytes: [u8; LEN] = bytes.try_into().map_err(|_| ParseError)?;
        Ok(Self(bytes))
    }

    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn of_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::hash::Hash for Checksum {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.fast_hash())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("not a valid checksum")]
pub struct ParseError;

/// A [`Read`] adapter computing a running digest of everything read through
/// it, standing in for spec.md's `bstream` whose `close` yields the
/// aggregate checksum of all bytes read.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    pub fn finish(self) -> Checksum {
        Checksum(self.hasher.finalize().into())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bad_checksum_is_invalid() {
        assert!(!BAD_CHECKSUM.is_valid());
        assert!(Checksum::of_bytes(b"x").is_valid());
    }

    #[test]
    fn hex_round_trip() {
        let c = Checksum::of_bytes(b"hello world");
        let hex = c.to_hex();
        assert_eq!(Checksum::from_hex(&hex).unwrap(), c);
    }

    #[test]
    fn hashing_reader_matches_direct_digest() {
        let data = b"some file contents go here";
        let mut r = HashingReader::new(&data[..]);
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(r.finish(), Checksum::of_bytes(data));
    }
}
