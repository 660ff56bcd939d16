//! Rewrites a file's DACL so the named user holds full access,
//! preserving every explicit deny entry.

use std::path::PathBuf;
use std::process::exit;

use gumdrop::Options;

const USAGE: &str = "grantaccess <file name> <user name>";

#[derive(Debug, Options)]
struct ArgOptions {
    #[options(help = "print help message")]
    help: bool,

    #[options(free, help = "file to change, then the user to grant access to")]
    args: Vec<String>,
}

fn main() {
    let args = ArgOptions::parse_args_default_or_exit();

    let [file, user, ..] = args.args.as_slice() else {
        println!("{USAGE}");
        exit(1);
    };

    if let Err(err) = run(&PathBuf::from(file), user) {
        eprintln!("ERROR: {err}");
        exit(-1);
    }
}

#[cfg(windows)]
fn run(file: &std::path::Path, user: &str) -> anyhow::Result<()> {
    use sdutils::{merge, sys, Acl};

    // resolve first: a bad user name must fail before the file's
    // security is even read, let alone changed
    let (target, _classification) = sys::lookup_account_name(user.as_ref())?;

    let descriptor = sys::FileSecurity::read_dacl(file.as_os_str())?;
    let old = descriptor.dacl()?.unwrap_or_else(Acl::empty);

    let merged = merge::grant_full_access(&old, &target)?;
    sys::write_dacl(file.as_os_str(), &merged.acl)?;

    Ok(())
}

#[cfg(not(windows))]
fn run(_file: &std::path::Path, _user: &str) -> anyhow::Result<()> {
    anyhow::bail!("grantaccess rewrites Windows security descriptors and only runs on Windows");
}
