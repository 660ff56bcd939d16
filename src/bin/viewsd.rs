//! Prints a file's security descriptor: control flags, owner, group,
//! and every DACL entry with decoded flags and rights.

use std::path::PathBuf;
use std::process::exit;

use gumdrop::Options;

const USAGE: &str = "viewsd <file name>";

#[derive(Debug, Options)]
struct ArgOptions {
    #[options(help = "print help message")]
    help: bool,

    #[options(free, help = "file whose security descriptor to print")]
    files: Vec<PathBuf>,
}

fn main() {
    let args = ArgOptions::parse_args_default_or_exit();

    let Some(file) = args.files.first() else {
        println!("{USAGE}");
        exit(1);
    };

    if let Err(err) = run(file) {
        eprintln!("ERROR: {err}");
        exit(-1);
    }
}

#[cfg(windows)]
fn run(file: &std::path::Path) -> anyhow::Result<()> {
    use std::io::Write;

    use sdutils::{report, sys};

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    writeln!(
        out,
        "Security Descriptor of {}",
        sys::full_path_name(file.as_os_str())?
    )?;
    writeln!(out)?;

    let descriptor = sys::FileSecurity::read_all(file.as_os_str())?;

    report::write_control_flags(&mut out, descriptor.control()?)?;
    writeln!(out, "Owner: {}", sys::lookup_account_sid(&descriptor.owner()?)?)?;
    writeln!(out, "Group: {}", sys::lookup_account_sid(&descriptor.group()?)?)?;

    match descriptor.dacl()? {
        Some(dacl) => report::write_dacl(&mut out, &dacl, sys::lookup_account_sid)?,
        None => writeln!(out, "Dacl:")?,
    }

    Ok(())
}

#[cfg(not(windows))]
fn run(_file: &std::path::Path) -> anyhow::Result<()> {
    anyhow::bail!("viewsd reads Windows security descriptors and only runs on Windows");
}
