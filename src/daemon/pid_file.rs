//! PID file written by the parent and removed by the child.
//!
//! The file holds the decimal process id and nothing else. It exists for
//! external supervision tools; this program never reads it back.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

pub fn write(path: &Path, pid: u32) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(pid.to_string().as_bytes())?;
    file.sync_all()
}

/// Remove the PID file. Returns `false` when it was already gone.
pub fn remove(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
