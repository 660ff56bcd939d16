//! Safe wrappers around the Win32 security calls the tools consume.
//!
//! Every platform allocation is scoped: descriptors returned by
//! `GetNamedSecurityInfoW` are freed on drop, and everything else is
//! copied into owned buffers before the call returns. The lookup
//! helpers follow the platform's size-then-fill convention — the first
//! call may only "fail" with `ERROR_INSUFFICIENT_BUFFER`; any other
//! first-call failure, and any second-call failure, is fatal.

use std::ffi::{c_void, OsStr};
use std::iter::once;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use windows_sys::Win32::Foundation::{
    GetLastError, LocalFree, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND,
    ERROR_INSUFFICIENT_BUFFER, ERROR_INVALID_SID, ERROR_NONE_MAPPED, ERROR_PATH_NOT_FOUND,
    ERROR_SUCCESS, BOOL,
};
use windows_sys::Win32::Security::Authorization::{
    GetNamedSecurityInfoW, SetNamedSecurityInfoW, SE_FILE_OBJECT,
};
use windows_sys::Win32::Security::{
    AclSizeInformation, GetAclInformation, GetLengthSid, GetSecurityDescriptorControl,
    GetSecurityDescriptorDacl, GetSecurityDescriptorGroup, GetSecurityDescriptorOwner, IsValidSid,
    LookupAccountNameW, LookupAccountSidW, ACL as RAW_ACL, ACL_SIZE_INFORMATION,
    DACL_SECURITY_INFORMATION, GROUP_SECURITY_INFORMATION, OWNER_SECURITY_INFORMATION,
    SECURITY_DESCRIPTOR_CONTROL, SID_NAME_USE,
};
use windows_sys::Win32::Storage::FileSystem::GetFullPathNameW;
use windows_sys::Win32::System::Diagnostics::Debug::{
    FormatMessageW, FORMAT_MESSAGE_ALLOCATE_BUFFER, FORMAT_MESSAGE_FROM_SYSTEM,
    FORMAT_MESSAGE_IGNORE_INSERTS,
};

use crate::acl::{Acl, ACL_HEADER_LEN};
use crate::error::Error;
use crate::sid::{Sid, SidUse};

/// Nul-terminated UTF-16 for the W-suffixed calls.
fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(once(0)).collect()
}

/// Copies bytes into a DWORD-aligned buffer. SIDs and ACLs handed to
/// the platform must be 4-byte aligned; a `Vec<u8>` makes no such
/// promise.
fn dword_aligned(bytes: &[u8]) -> Vec<u32> {
    let mut buf = vec![0u32; bytes.len().div_ceil(4)];
    // u32 -> u8 never misaligns
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), buf.as_mut_ptr().cast::<u8>(), bytes.len());
    }
    buf
}

/// The system's text for an error code, with the code itself as the
/// fallback when the system has none.
pub fn error_message(code: u32) -> String {
    let mut buffer: *mut u16 = ptr::null_mut();
    let length = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_ALLOCATE_BUFFER
                | FORMAT_MESSAGE_IGNORE_INSERTS,
            ptr::null(),
            code,
            0,
            &mut buffer as *mut *mut u16 as *mut u16,
            0,
            ptr::null(),
        )
    };
    if length == 0 || buffer.is_null() {
        return format!("unknown error (0x{code:08x})");
    }
    let message = unsafe {
        let slice = std::slice::from_raw_parts(buffer, length as usize);
        let text = String::from_utf16_lossy(slice);
        LocalFree(buffer as *mut c_void);
        text
    };
    message.trim_end().to_string()
}

fn error_from(code: u32) -> Error {
    let message = error_message(code);
    match code {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => Error::ObjectNotFound { message },
        ERROR_ACCESS_DENIED => Error::AccessDenied { message },
        ERROR_NONE_MAPPED => Error::IdentityNotFound { message },
        _ => Error::PlatformQuery { code, message },
    }
}

fn last_error() -> Error {
    error_from(unsafe { GetLastError() })
}

/// First phase of a size-then-fill query: failure is the expected
/// outcome, and only `ERROR_INSUFFICIENT_BUFFER` is acceptable.
fn check_sizing(ok: BOOL) -> Result<(), Error> {
    if ok == 0 {
        let code = unsafe { GetLastError() };
        if code != ERROR_INSUFFICIENT_BUFFER {
            return Err(error_from(code));
        }
    }
    Ok(())
}

/// Second phase: the buffers are sized, so any failure is fatal.
fn check_filled(ok: BOOL) -> Result<(), Error> {
    if ok == 0 {
        return Err(last_error());
    }
    Ok(())
}

/// Resolves an account name (`user` or `DOMAIN\user`) on the local
/// system to its SID and classification.
pub fn lookup_account_name(name: &OsStr) -> Result<(Sid, SidUse), Error> {
    let wname = wide(name);
    let mut sid_len: u32 = 0;
    let mut domain_len: u32 = 0;
    let mut use_raw: SID_NAME_USE = 0;

    let probed = unsafe {
        LookupAccountNameW(
            ptr::null(),
            wname.as_ptr(),
            ptr::null_mut(),
            &mut sid_len,
            ptr::null_mut(),
            &mut domain_len,
            &mut use_raw,
        )
    };
    check_sizing(probed)?;

    let mut sid_buf = vec![0u8; sid_len as usize];
    let mut domain = vec![0u16; domain_len as usize];
    let filled = unsafe {
        LookupAccountNameW(
            ptr::null(),
            wname.as_ptr(),
            sid_buf.as_mut_ptr().cast::<c_void>(),
            &mut sid_len,
            domain.as_mut_ptr(),
            &mut domain_len,
            &mut use_raw,
        )
    };
    check_filled(filled)?;

    Ok((Sid::from_bytes(&sid_buf)?, SidUse::from_raw(use_raw)))
}

/// Resolves a SID back to `DOMAIN\name`, or the bare name when the
/// domain component comes back empty.
pub fn lookup_account_sid(sid: &Sid) -> Result<String, Error> {
    let aligned = dword_aligned(sid.as_bytes());
    let psid = aligned.as_ptr() as *mut c_void;
    let mut name_len: u32 = 0;
    let mut domain_len: u32 = 0;
    let mut use_raw: SID_NAME_USE = 0;

    let probed = unsafe {
        LookupAccountSidW(
            ptr::null(),
            psid,
            ptr::null_mut(),
            &mut name_len,
            ptr::null_mut(),
            &mut domain_len,
            &mut use_raw,
        )
    };
    check_sizing(probed)?;

    let mut name = vec![0u16; name_len as usize];
    let mut domain = vec![0u16; domain_len as usize];
    let filled = unsafe {
        LookupAccountSidW(
            ptr::null(),
            psid,
            name.as_mut_ptr(),
            &mut name_len,
            domain.as_mut_ptr(),
            &mut domain_len,
            &mut use_raw,
        )
    };
    check_filled(filled)?;

    let name = String::from_utf16_lossy(&name[..name_len as usize]);
    if domain_len == 0 {
        Ok(name)
    } else {
        let domain = String::from_utf16_lossy(&domain[..domain_len as usize]);
        Ok(format!("{domain}\\{name}"))
    }
}

/// Absolute form of a path, by way of `GetFullPathNameW`'s own
/// size-then-fill convention (the required length is the return value).
pub fn full_path_name(path: &OsStr) -> Result<String, Error> {
    let wpath = wide(path);

    let required = unsafe { GetFullPathNameW(wpath.as_ptr(), 0, ptr::null_mut(), ptr::null_mut()) };
    if required == 0 {
        return Err(last_error());
    }

    let mut buffer = vec![0u16; required as usize];
    let written = unsafe {
        GetFullPathNameW(
            wpath.as_ptr(),
            required,
            buffer.as_mut_ptr(),
            ptr::null_mut(),
        )
    };
    if written == 0 {
        return Err(last_error());
    }

    Ok(String::from_utf16_lossy(&buffer[..written as usize]))
}

/// A file's security descriptor, snapshotted by
/// `GetNamedSecurityInfoW`. Owns the platform allocation and frees it
/// on drop, on every exit path.
pub struct FileSecurity {
    descriptor: *mut c_void,
}

impl FileSecurity {
    /// Reads only the DACL, as the grant tool does.
    pub fn read_dacl(path: &OsStr) -> Result<FileSecurity, Error> {
        FileSecurity::read_parts(path, DACL_SECURITY_INFORMATION)
    }

    /// Reads DACL, owner, and group, as the viewer does.
    pub fn read_all(path: &OsStr) -> Result<FileSecurity, Error> {
        FileSecurity::read_parts(
            path,
            DACL_SECURITY_INFORMATION | OWNER_SECURITY_INFORMATION | GROUP_SECURITY_INFORMATION,
        )
    }

    fn read_parts(path: &OsStr, parts: u32) -> Result<FileSecurity, Error> {
        let wpath = wide(path);
        let mut descriptor: *mut c_void = ptr::null_mut();
        let status = unsafe {
            GetNamedSecurityInfoW(
                wpath.as_ptr(),
                SE_FILE_OBJECT,
                parts,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                &mut descriptor,
            )
        };
        if status != ERROR_SUCCESS {
            return Err(error_from(status));
        }
        Ok(FileSecurity { descriptor })
    }

    /// The descriptor's control word.
    pub fn control(&self) -> Result<u16, Error> {
        let mut control: SECURITY_DESCRIPTOR_CONTROL = 0;
        let mut revision: u32 = 0;
        let ok = unsafe {
            GetSecurityDescriptorControl(self.descriptor, &mut control, &mut revision)
        };
        check_filled(ok)?;
        Ok(control)
    }

    pub fn owner(&self) -> Result<Sid, Error> {
        let mut psid: *mut c_void = ptr::null_mut();
        let mut defaulted: BOOL = 0;
        let ok =
            unsafe { GetSecurityDescriptorOwner(self.descriptor, &mut psid, &mut defaulted) };
        check_filled(ok)?;
        unsafe { copy_sid(psid) }
    }

    pub fn group(&self) -> Result<Sid, Error> {
        let mut psid: *mut c_void = ptr::null_mut();
        let mut defaulted: BOOL = 0;
        let ok =
            unsafe { GetSecurityDescriptorGroup(self.descriptor, &mut psid, &mut defaulted) };
        check_filled(ok)?;
        unsafe { copy_sid(psid) }
    }

    /// A by-value snapshot of the DACL, trimmed to its bytes in use.
    /// `None` when the descriptor carries no DACL at all (the
    /// everything-allowed state).
    pub fn dacl(&self) -> Result<Option<Acl>, Error> {
        let mut present: BOOL = 0;
        let mut pacl: *mut RAW_ACL = ptr::null_mut();
        let mut defaulted: BOOL = 0;
        let ok = unsafe {
            GetSecurityDescriptorDacl(self.descriptor, &mut present, &mut pacl, &mut defaulted)
        };
        check_filled(ok)?;
        if present == 0 || pacl.is_null() {
            return Ok(None);
        }

        let mut info: ACL_SIZE_INFORMATION = unsafe { mem::zeroed() };
        let ok = unsafe {
            GetAclInformation(
                pacl,
                &mut info as *mut ACL_SIZE_INFORMATION as *mut c_void,
                mem::size_of::<ACL_SIZE_INFORMATION>() as u32,
                AclSizeInformation,
            )
        };
        check_filled(ok)?;

        let in_use = info.AclBytesInUse as usize;
        if in_use < ACL_HEADER_LEN {
            return Err(error_from(ERROR_INVALID_SID));
        }
        let mut bytes =
            unsafe { std::slice::from_raw_parts(pacl.cast::<u8>(), in_use) }.to_vec();
        // the snapshot drops the free tail, so restate the size field
        bytes[2..4].copy_from_slice(&(in_use as u16).to_le_bytes());

        Ok(Some(Acl::from_bytes(&bytes)?))
    }
}

impl Drop for FileSecurity {
    fn drop(&mut self) {
        if !self.descriptor.is_null() {
            unsafe { LocalFree(self.descriptor) };
        }
    }
}

/// Reads a SID out of platform-owned memory into an owned [`Sid`].
unsafe fn copy_sid(psid: *mut c_void) -> Result<Sid, Error> {
    if psid.is_null() || IsValidSid(psid) == 0 {
        return Err(error_from(ERROR_INVALID_SID));
    }
    let len = GetLengthSid(psid) as usize;
    let bytes = std::slice::from_raw_parts(psid.cast::<u8>(), len);
    Ok(Sid::from_bytes(bytes)?)
}

/// Replaces the file's DACL and nothing else. One call, all or
/// nothing; owner, group, and SACL stay untouched.
pub fn write_dacl(path: &OsStr, acl: &Acl) -> Result<(), Error> {
    let wpath = wide(path);
    let aligned = dword_aligned(acl.as_bytes());
    let status = unsafe {
        SetNamedSecurityInfoW(
            wpath.as_ptr(),
            SE_FILE_OBJECT,
            DACL_SECURITY_INFORMATION,
            ptr::null_mut(),
            ptr::null_mut(),
            aligned.as_ptr().cast::<RAW_ACL>(),
            ptr::null(),
        )
    };
    if status != ERROR_SUCCESS {
        return Err(error_from(status));
    }
    Ok(())
}
