//! Fixed-capacity access control lists over raw self-relative images.

use thiserror::Error;

use crate::ace::{Ace, AceError, ACE_HEADER_LEN};

/// `ACL_REVISION`. Lists rebuilt by this crate are always revision 2;
/// revision 4 (`ACL_REVISION_DS`) images decode fine since object-type
/// entries pass through as opaque blobs.
pub const ACL_REVISION: u8 = 2;

/// `sizeof(ACL)`: revision, sbz1, size, count, sbz2.
pub const ACL_HEADER_LEN: usize = 8;

/// The header stores the total size in 16 bits.
pub const MAX_ACL_BYTES: usize = u16::MAX as usize;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclError {
    #[error("ACL image of {0} bytes is shorter than the {ACL_HEADER_LEN}-byte header")]
    Truncated(usize),
    #[error("unsupported ACL revision {0}")]
    Revision(u8),
    #[error("ACL declares {declared} bytes but occupies {actual}")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("requested ACL capacity {0} is out of range")]
    BadCapacity(usize),
    #[error("entry #{index} runs past the end of the ACL")]
    EntryOverrun { index: usize },
    #[error("entry #{index}: {source}")]
    Entry { index: usize, source: AceError },
    #[error("appending a {needed}-byte entry to an ACL with {free} free bytes")]
    CapacityExceeded { needed: usize, free: usize },
}

/// An owned access control list.
///
/// The image keeps the fixed capacity chosen at construction; entries
/// are appended into the free tail and never removed. Order is
/// significant and preserved. Every entry is validated up front, so
/// iteration over a constructed list cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    buf: Vec<u8>,
    used: usize,
}

impl Acl {
    /// An empty revision-2 list with no free space, for descriptors that
    /// carry no DACL at all.
    pub fn empty() -> Acl {
        Acl {
            buf: new_header(ACL_HEADER_LEN),
            used: ACL_HEADER_LEN,
        }
    }

    /// Initializes an empty list with a fixed byte capacity, the
    /// `InitializeAcl` analog. The capacity is never grown afterwards.
    pub fn with_capacity(capacity: usize) -> Result<Acl, AclError> {
        if !(ACL_HEADER_LEN..=MAX_ACL_BYTES).contains(&capacity) {
            return Err(AclError::BadCapacity(capacity));
        }
        Ok(Acl {
            buf: new_header(capacity),
            used: ACL_HEADER_LEN,
        })
    }

    /// Validates a complete ACL image, walking every entry.
    pub fn from_bytes(bytes: &[u8]) -> Result<Acl, AclError> {
        if bytes.len() < ACL_HEADER_LEN {
            return Err(AclError::Truncated(bytes.len()));
        }
        if bytes.len() > MAX_ACL_BYTES {
            return Err(AclError::SizeMismatch {
                declared: u16::from_le_bytes([bytes[2], bytes[3]]) as usize,
                actual: bytes.len(),
            });
        }
        let revision = bytes[0];
        if !(ACL_REVISION..=4).contains(&revision) {
            return Err(AclError::Revision(revision));
        }
        let declared = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        if declared != bytes.len() {
            return Err(AclError::SizeMismatch {
                declared,
                actual: bytes.len(),
            });
        }
        let count = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;

        let mut offset = ACL_HEADER_LEN;
        for index in 0..count {
            if offset + ACE_HEADER_LEN > bytes.len() {
                return Err(AclError::EntryOverrun { index });
            }
            let size = u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
            if size < ACE_HEADER_LEN || offset + size > bytes.len() {
                return Err(AclError::EntryOverrun { index });
            }
            Ace::decode(&bytes[offset..offset + size])
                .map_err(|source| AclError::Entry { index, source })?;
            offset += size;
        }

        Ok(Acl {
            buf: bytes.to_vec(),
            used: offset,
        })
    }

    /// Total bytes the image occupies, used or not (`AclSize`).
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Header plus every entry (`AclBytesInUse`).
    pub fn bytes_in_use(&self) -> usize {
        self.used
    }

    pub fn ace_count(&self) -> usize {
        u16::from_le_bytes([self.buf[4], self.buf[5]]) as usize
    }

    /// Appends one entry into the free tail, the `AddAce`-at-the-end
    /// analog. Fails without touching the list when the entry does not
    /// fit; nothing is ever resized.
    pub fn append(&mut self, ace: &Ace) -> Result<(), AclError> {
        let needed = ace.len();
        let free = self.capacity() - self.used;
        if needed > free {
            return Err(AclError::CapacityExceeded { needed, free });
        }
        self.buf[self.used..self.used + needed].copy_from_slice(ace.as_bytes());
        self.used += needed;
        let count = self.ace_count() as u16 + 1;
        self.buf[4..6].copy_from_slice(&count.to_le_bytes());
        Ok(())
    }

    /// Iterates the entries in list order.
    pub fn aces(&self) -> Aces<'_> {
        Aces {
            buf: &self.buf,
            offset: ACL_HEADER_LEN,
            remaining: self.ace_count(),
        }
    }

    /// The full image, suitable to hand to the platform as a `PACL`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

fn new_header(capacity: usize) -> Vec<u8> {
    let mut buf = vec![0u8; capacity];
    buf[0] = ACL_REVISION;
    buf[2..4].copy_from_slice(&(capacity as u16).to_le_bytes());
    buf
}

pub struct Aces<'a> {
    buf: &'a [u8],
    offset: usize,
    remaining: usize,
}

impl Iterator for Aces<'_> {
    type Item = Ace;

    fn next(&mut self) -> Option<Ace> {
        if self.remaining == 0 {
            return None;
        }
        let size = u16::from_le_bytes([self.buf[self.offset + 2], self.buf[self.offset + 3]]) as usize;
        // entries were validated when the list was built
        let ace = Ace::decode(&self.buf[self.offset..self.offset + size]).ok()?;
        self.offset += size;
        self.remaining -= 1;
        Some(ace)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
