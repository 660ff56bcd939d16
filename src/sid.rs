//! Security identifiers in their self-relative binary form.

use std::fmt;
use std::str::FromStr;

use strum_macros::{Display, EnumIter, FromRepr};
use thiserror::Error;

/// Upper bound on sub-authorities in a single SID (`SID_MAX_SUB_AUTHORITIES`).
pub const MAX_SUB_AUTHORITIES: usize = 15;

/// Fixed part of a binary SID: revision, count, and the 48-bit authority.
const SID_HEADER_LEN: usize = 8;

const SID_REVISION: u8 = 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidError {
    #[error("SID image of {0} bytes is shorter than the {SID_HEADER_LEN}-byte header")]
    Truncated(usize),
    #[error("unsupported SID revision {0}")]
    Revision(u8),
    #[error("SID claims {0} sub-authorities, the limit is {MAX_SUB_AUTHORITIES}")]
    SubAuthorityCount(u8),
    #[error("SID image ends before its declared sub-authorities")]
    ShortSubAuthorities,
    #[error("malformed SID string")]
    Parse,
}

/// What a resolved account name turned out to be.
///
/// Mirrors `SID_NAME_USE`; informational only — nothing in the tools
/// branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, FromRepr)]
#[repr(i32)]
pub enum SidUse {
    User = 1,
    Group = 2,
    Domain = 3,
    Alias = 4,
    WellKnownGroup = 5,
    DeletedAccount = 6,
    Invalid = 7,
    Unknown = 8,
    Computer = 9,
    Label = 10,
    LogonSession = 11,
}

impl SidUse {
    pub fn from_raw(raw: i32) -> SidUse {
        SidUse::from_repr(raw).unwrap_or(SidUse::Unknown)
    }
}

/// An owned security identifier.
///
/// Holds the self-relative image: `revision (1) | sub-authority count (1)
/// | identifier authority (6, big-endian) | sub-authorities (4 each,
/// little-endian)`. SIDs are immutable once obtained and compared only by
/// byte equality, matching `EqualSid`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Sid(Vec<u8>);

impl Sid {
    /// Reads a SID from the front of `bytes`.
    ///
    /// Trailing bytes past the SID's own length are ignored; ACE images
    /// may pad their tail.
    pub fn from_bytes(bytes: &[u8]) -> Result<Sid, SidError> {
        if bytes.len() < SID_HEADER_LEN {
            return Err(SidError::Truncated(bytes.len()));
        }
        if bytes[0] != SID_REVISION {
            return Err(SidError::Revision(bytes[0]));
        }
        let count = bytes[1];
        if count as usize > MAX_SUB_AUTHORITIES {
            return Err(SidError::SubAuthorityCount(count));
        }
        let len = SID_HEADER_LEN + 4 * count as usize;
        if bytes.len() < len {
            return Err(SidError::ShortSubAuthorities);
        }
        Ok(Sid(bytes[..len].to_vec()))
    }

    /// Builds a SID from an identifier authority and its sub-authorities.
    pub fn from_parts(authority: u64, sub_authorities: &[u32]) -> Result<Sid, SidError> {
        if sub_authorities.len() > MAX_SUB_AUTHORITIES {
            return Err(SidError::SubAuthorityCount(sub_authorities.len() as u8));
        }
        let mut bytes = Vec::with_capacity(SID_HEADER_LEN + 4 * sub_authorities.len());
        bytes.push(SID_REVISION);
        bytes.push(sub_authorities.len() as u8);
        bytes.extend_from_slice(&authority.to_be_bytes()[2..]);
        for sub in sub_authorities {
            bytes.extend_from_slice(&sub.to_le_bytes());
        }
        Ok(Sid(bytes))
    }

    /// Length in bytes of the binary image (`GetLengthSid`).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn revision(&self) -> u8 {
        self.0[0]
    }

    pub fn sub_authority_count(&self) -> u8 {
        self.0[1]
    }

    /// The 48-bit identifier authority, widened to a `u64`.
    pub fn identifier_authority(&self) -> u64 {
        self.0[2..8]
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
    }

    pub fn sub_authority(&self, index: usize) -> Option<u32> {
        let start = SID_HEADER_LEN + 4 * index;
        let bytes = self.0.get(start..start + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision(), self.identifier_authority())?;
        for index in 0..self.sub_authority_count() as usize {
            // in range: the image was validated on construction
            if let Some(sub) = self.sub_authority(index) {
                write!(f, "-{sub}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({self})")
    }
}

impl FromStr for Sid {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Sid, SidError> {
        let rest = s.strip_prefix("S-").ok_or(SidError::Parse)?;
        let mut parts = rest.split('-');
        let revision: u8 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(SidError::Parse)?;
        if revision != SID_REVISION {
            return Err(SidError::Revision(revision));
        }
        let authority: u64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(SidError::Parse)?;
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| SidError::Parse))
            .collect::<Result<Vec<_>, _>>()?;
        Sid::from_parts(authority, &sub_authorities)
    }
}
