//! Positioned I/O over a device or image file.
//!
//! A [`Disk`] wraps the open file handle and addresses it by absolute byte
//! offset. Sizes are taken by seeking to the end so block devices (whose
//! metadata length is zero) report correctly.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{F7Error, SECTOR_SIZE};

/// Transfer granularity when the filesystem does not report one.
const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// An open device or image file.
#[derive(Debug)]
pub struct Disk {
    file: File,
}

impl Disk {
    /// Opens read-only, for inspection commands.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, F7Error> {
        let file = File::open(path)
            .map_err(|e| F7Error::io("open the requested device/image file", e))?;
        Ok(Self { file })
    }

    /// Opens read-write, for mutating commands.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self, F7Error> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| F7Error::io("open the requested device/image file", e))?;
        Ok(Self { file })
    }

    /// Total size in bytes.
    pub fn size_bytes(&mut self) -> Result<u64, F7Error> {
        self.file
            .seek(SeekFrom::End(0))
            .map_err(|e| F7Error::io("retrieve the file size", e))
    }

    /// Whole sectors available.
    pub fn sectors(&mut self) -> Result<u64, F7Error> {
        Ok(self.size_bytes()? / SECTOR_SIZE)
    }

    /// Reads at `offset` until `buf` is full or the file ends.
    ///
    /// Returns the number of bytes read; callers decide whether a short
    /// read is an error (the MBR and header codecs report the count).
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, F7Error> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| F7Error::io("seek the file offset", e))?;
        read_full(&mut self.file, buf)
            .map_err(|e| F7Error::io("read the requested device/image file", e))
    }

    /// Writes the whole buffer at `offset`.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), F7Error> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| F7Error::io("seek the file offset", e))?;
        self.file
            .write_all(buf)
            .map_err(|e| F7Error::io("write to the requested device/image file", e))
    }

    /// Preferred copy granularity of the underlying filesystem.
    pub fn block_size(&self) -> u64 {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if let Ok(meta) = self.file.metadata() {
                let blksize = meta.blksize();
                if blksize > 0 {
                    return blksize;
                }
            }
        }
        DEFAULT_BLOCK_SIZE
    }

    /// Streams `rem` bytes from `src`'s current position to this disk
    /// starting at `offset`, one preferred-size block at a time.
    ///
    /// `copied` accumulates bytes landed on disk across the whole calling
    /// operation and `total` is that operation's grand total; both feed
    /// the partial-copy diagnostics when a transfer stops early.
    pub(crate) fn copy_chunks(
        &mut self,
        src: &mut File,
        offset: u64,
        mut rem: u64,
        copied: &mut u64,
        total: u64,
        op: &'static str,
    ) -> Result<(), F7Error> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| F7Error::io("seek the file offset", e))?;

        let block = self.block_size().max(1);
        let mut buf = vec![0u8; block.min(rem.max(1)) as usize];

        while rem > 0 {
            let count = block.min(rem) as usize;
            let got = match read_full(src, &mut buf[..count]) {
                Ok(got) => got,
                Err(e) => {
                    warn_partial(*copied, total);
                    return Err(F7Error::io(op, e));
                }
            };
            if got < count {
                warn_partial(*copied, total);
                return Err(F7Error::ShortCopy {
                    requested: total,
                    copied: *copied,
                });
            }

            let mut written = 0usize;
            while written < count {
                match self.file.write(&buf[written..count]) {
                    Ok(0) => {
                        *copied += written as u64;
                        warn_partial(*copied, total);
                        return Err(F7Error::ShortCopy {
                            requested: total,
                            copied: *copied,
                        });
                    }
                    Ok(n) => written += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        *copied += written as u64;
                        warn_partial(*copied, total);
                        return Err(F7Error::io(op, e));
                    }
                }
            }

            rem -= count as u64;
            *copied += count as u64;
        }
        Ok(())
    }
}

/// Reads until `buf` is full or EOF; short only at end of file.
fn read_full(src: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn warn_partial(copied: u64, total: u64) {
    if copied < total {
        log::warn!("{copied}/{total} bytes were actually copied");
    }
}
