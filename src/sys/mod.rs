//! Platform plumbing over the Win32 security API.

mod windows;

pub use windows::*;
