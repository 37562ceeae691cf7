//! Buffered random-access file wrapper
//!
//! [`BufferedChannel`] wraps a seekable file with one read buffer and one
//! write buffer. Positional reads are served from the write buffer, the read
//! buffer or the file, in that order of precedence. Sequential writes are
//! coalesced until they stop being contiguous or overflow the buffer.
//!
//! The channel tracks a logical size that includes buffered writes. Reading
//! a range that lies beyond the physical end of the file but below a
//! buffered write returns zeros, as the file would after a flush.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::Range;

/// Random-access file with read and write buffering
#[derive(Debug)]
pub struct BufferedChannel<F = File> {
    inner: F,
    size: u64,
    read_buf: Vec<u8>,
    read_pos: u64,
    read_capacity: usize,
    write_buf: Vec<u8>,
    write_pos: u64,
    write_capacity: usize,
}

impl<F: Read + Write + Seek> BufferedChannel<F> {
    /// Wrap `inner` with the given buffer capacities.
    ///
    /// A capacity of zero disables that buffer.
    pub fn new(mut inner: F, read_capacity: usize, write_capacity: usize) -> io::Result<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            size,
            read_buf: Vec::with_capacity(read_capacity),
            read_pos: 0,
            read_capacity,
            write_buf: Vec::with_capacity(write_capacity),
            write_pos: 0,
            write_capacity,
        })
    }

    /// Logical size, including buffered writes
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Fill `dest` with the bytes starting at `pos`.
    ///
    /// Fails with [`ErrorKind::UnexpectedEof`] if the range extends past the
    /// logical size.
    pub fn read_at(&mut self, pos: u64, dest: &mut [u8]) -> io::Result<()> {
        let len = dest.len() as u64;
        let end = pos
            .checked_add(len)
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "read range overflows"))?;
        if end > self.size {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("read of {len} bytes at {pos} past end of channel ({})", self.size),
            ));
        }
        if dest.is_empty() {
            return Ok(());
        }

        if let Some(src) = slice_within(self.write_range(), pos..end) {
            dest.copy_from_slice(&self.write_buf[src]);
            return Ok(());
        }

        dest.fill(0);

        let mut filled = 0;
        if let Some(src) = slice_within(self.read_range(), pos..end) {
            dest.copy_from_slice(&self.read_buf[src]);
            filled = dest.len();
        } else if let Some((src, dst)) = overlap(self.read_range(), pos..end)
            && dst.start == 0
        {
            filled = dst.end;
            dest[dst].copy_from_slice(&self.read_buf[src]);
        }

        let remaining = dest.len() - filled;
        if remaining > 0 {
            let from = pos + filled as u64;
            if remaining > self.read_capacity {
                self.inner.seek(SeekFrom::Start(from))?;
                read_until_eof(&mut self.inner, &mut dest[filled..])?;
            } else {
                self.fill_read_buffer(from)?;
                let n = remaining.min(self.read_buf.len());
                dest[filled..filled + n].copy_from_slice(&self.read_buf[..n]);
            }
        }

        if let Some((src, dst)) = overlap(self.write_range(), pos..end) {
            dest[dst].copy_from_slice(&self.write_buf[src]);
        }

        Ok(())
    }

    /// Write `src` at `pos`, extending the logical size if needed.
    pub fn write_at(&mut self, pos: u64, src: &[u8]) -> io::Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        let end = pos
            .checked_add(src.len() as u64)
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "write range overflows"))?;

        if !self.write_buf.is_empty() {
            let buf_end = self.write_pos + self.write_buf.len() as u64;
            let mergeable = pos >= self.write_pos
                && pos <= buf_end
                && end - self.write_pos <= self.write_capacity as u64;
            if !mergeable {
                self.flush_write_buffer()?;
            }
        }

        if src.len() > self.write_capacity {
            self.inner.seek(SeekFrom::Start(pos))?;
            self.inner.write_all(src)?;
            self.patch_read_buffer(pos, src);
        } else {
            if self.write_buf.is_empty() {
                self.write_pos = pos;
            }
            let start = (pos - self.write_pos) as usize;
            let stop = start + src.len();
            if stop > self.write_buf.len() {
                self.write_buf.resize(stop, 0);
            }
            self.write_buf[start..stop].copy_from_slice(src);
        }

        self.size = self.size.max(end);
        Ok(())
    }

    /// Write buffered data through to the underlying file
    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_write_buffer()?;
        self.inner.flush()
    }

    /// Flush and return the wrapped file
    pub fn into_inner(mut self) -> io::Result<F> {
        self.flush()?;
        Ok(self.inner)
    }

    fn flush_write_buffer(&mut self) -> io::Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.inner.seek(SeekFrom::Start(self.write_pos))?;
        self.inner.write_all(&self.write_buf)?;

        let buf = std::mem::take(&mut self.write_buf);
        self.patch_read_buffer(self.write_pos, &buf);
        self.write_buf = buf;
        self.write_buf.clear();
        Ok(())
    }

    fn fill_read_buffer(&mut self, pos: u64) -> io::Result<()> {
        self.read_buf.resize(self.read_capacity, 0);
        self.inner.seek(SeekFrom::Start(pos))?;
        let n = read_until_eof(&mut self.inner, &mut self.read_buf)?;
        self.read_buf.truncate(n);
        self.read_pos = pos;
        Ok(())
    }

    // Keep the read buffer coherent with data that just reached the file.
    fn patch_read_buffer(&mut self, pos: u64, data: &[u8]) {
        let range = pos..pos + data.len() as u64;
        if let Some((in_data, in_buf)) = overlap(range, self.read_range()) {
            self.read_buf[in_buf].copy_from_slice(&data[in_data]);
        }
    }

    fn read_range(&self) -> Range<u64> {
        self.read_pos..self.read_pos + self.read_buf.len() as u64
    }

    fn write_range(&self) -> Range<u64> {
        self.write_pos..self.write_pos + self.write_buf.len() as u64
    }
}

/// Buffer-relative range of `want`, if `have` contains all of it.
fn slice_within(have: Range<u64>, want: Range<u64>) -> Option<Range<usize>> {
    if have.is_empty() || want.start < have.start || want.end > have.end {
        return None;
    }
    let start = (want.start - have.start) as usize;
    Some(start..start + (want.end - want.start) as usize)
}

/// Intersection of two absolute ranges, as offsets relative to each.
fn overlap(a: Range<u64>, b: Range<u64>) -> Option<(Range<usize>, Range<usize>)> {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    if start >= end {
        return None;
    }
    let len = (end - start) as usize;
    let a_off = (start - a.start) as usize;
    let b_off = (start - b.start) as usize;
    Some((a_off..a_off + len, b_off..b_off + len))
}

fn read_until_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match reader.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(read) => n += read,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}
