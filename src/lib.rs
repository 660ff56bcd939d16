//! Building blocks for inspecting and rewriting Windows file security
//! descriptors.
//!
//! The crate ships two binaries built on this library: `viewsd`, which
//! prints a file's control flags, owner, group, and DACL entries, and
//! `grantaccess`, which rebuilds a file's DACL so that one user holds
//! full access while every explicit deny entry is preserved.
//!
//! The SID/ACE/ACL model and the DACL rebuild live in portable code and
//! operate on the self-relative binary images the platform hands out.
//! Only the `sys` module talks to Win32, so the core compiles and is
//! tested on every target.

pub mod ace;
pub mod acl;
pub mod error;
pub mod merge;
pub mod report;
pub mod sid;
#[cfg(windows)]
pub mod sys;

pub use ace::{Ace, AceKind};
pub use acl::Acl;
pub use error::Error;
pub use sid::Sid;
