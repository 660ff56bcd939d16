use thiserror::Error;

use crate::acl::AclError;
use crate::sid::SidError;

/// Error returned by descriptor reads/writes and identity resolution.
///
/// The platform variants carry the OS-supplied human-readable message;
/// the tools print it verbatim after an `ERROR: ` prefix. Every error is
/// fatal to the invocation that raised it.
#[derive(Error, Debug)]
pub enum Error {
    /// The account name could not be resolved on the local system or its
    /// trust domain.
    #[error("{message}")]
    IdentityNotFound { message: String },
    /// The file path does not exist.
    #[error("{message}")]
    ObjectNotFound { message: String },
    /// The caller lacks the rights to read or replace security
    /// information on the object.
    #[error("{message}")]
    AccessDenied { message: String },
    /// Any other platform-call failure.
    #[error("{message}")]
    PlatformQuery { code: u32, message: String },
    /// A malformed or over-capacity ACL image.
    #[error(transparent)]
    Acl(#[from] AclError),
    /// A malformed SID image.
    #[error(transparent)]
    Sid(#[from] SidError),
}
