// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// File-system port: directory listing and random-access file I/O (spec.md
// §1 "out of scope", §6 "File-system port").
//
// The wire-level spec describes a C-shaped API (`fopen`/`fseek`/`fread`/
// `fwrite`/`fclose` plus a `filelist_get` out-buffer callback); the trait
// below keeps the same operations but expresses them the idiomatic-Rust way
// (`Read + Seek` via `std::fs::File`, `Result` instead of return codes), the
// way the teacher wraps platform syscalls (`platform::posix`/`windows`)
// behind one portable trait rather than exposing raw fds/HANDLEs to callers.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::PortError;

/// Sentinel the wire protocol uses for "append" (WRITE) or "no seek, read
/// from current position" (READ) (spec.md §4.7 "Offsets").
pub const NO_SEEK: u32 = 0xFFFF_FFFF;

/// Server-side file and directory access consumed by the file service.
pub trait FileSystemPort: Send + Sync {
    /// Directory listing, in whatever opaque format the host's listing
    /// routine produces — the core treats the bytes as a blob and forwards
    /// them verbatim (spec.md §4.7 "Response payload format is whatever
    /// `filelist_get` produced").
    fn list_dir(&self, dir: &str) -> Result<Vec<u8>, PortError>;

    /// Read up to `max_len` bytes from `path`. `offset == None` means read
    /// from the current position without seeking first (effectively the
    /// start, for a freshly opened handle).
    fn read(&self, path: &str, offset: Option<u32>, max_len: usize) -> Result<Vec<u8>, PortError>;

    /// Write `data` to `path`. `offset == None` means append; opens for
    /// read-write (creating if absent) otherwise and seeks first.
    fn write(&self, path: &str, offset: Option<u32>, data: &[u8]) -> Result<(), PortError>;
}

/// `std::fs`-backed `FileSystemPort`, rooted at a directory so paths from the
/// wire (which name files relative to the device's storage) can't escape it.
pub struct StdFileSystem {
    root: std::path::PathBuf,
}

impl StdFileSystem {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileSystemPort for StdFileSystem {
    fn list_dir(&self, dir: &str) -> Result<Vec<u8>, PortError> {
        let target = self.resolve(dir);
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&target)? {
            let entry = entry?;
            out.extend_from_slice(entry.file_name().as_encoded_bytes());
            out.push(b'\n');
        }
        Ok(out)
    }

    fn read(&self, path: &str, offset: Option<u32>, max_len: usize) -> Result<Vec<u8>, PortError> {
        let target = self.resolve(path);
        if !target.exists() {
            return Err(PortError::NoSuchFile(path.to_string()));
        }
        let mut file = std::fs::File::open(&target)?;
        if let Some(off) = offset {
            file.seek(SeekFrom::Start(off as u64))?;
        }
        let mut buf = vec![0u8; max_len];
        let n = read_up_to(&mut file, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&self, path: &str, offset: Option<u32>, data: &[u8]) -> Result<(), PortError> {
        let target = self.resolve(path);
        let mut file = match offset {
            None => OpenOptions::new().create(true).append(true).open(&target)?,
            Some(off) => {
                let mut f = OpenOptions::new().create(true).read(true).write(true).open(&target)?;
                f.seek(SeekFrom::Start(off as u64))?;
                f
            }
        };
        file.write_all(data)?;
        Ok(())
    }
}

/// Reads until `buf` is full or EOF, returning the number of bytes read —
/// `Read::read` alone may return short reads that aren't EOF.
fn read_up_to(file: &mut std::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}
