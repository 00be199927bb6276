//! A forward-only cursor over an in-memory snapshot buffer, with
//! HPROF's one wrinkle: object ids are either 4 or 8 bytes, fixed for
//! the whole file, and discovered only after reading the header.

use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ReadBytesExt};

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    pub id_size: u8,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], id_size: u8) -> Self {
        Self { buf, pos: 0, id_size }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            bail!("unexpected end of snapshot at offset {} (wanted {} more bytes)", self.pos, n);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take(2)?.read_u16::<BigEndian>().context("reading u16")
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4)?.read_u32::<BigEndian>().context("reading u32")
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.take(8)?.read_u64::<BigEndian>().context("reading u64")
    }

    /// Reads an object id, zero-extended to `u64` regardless of the
    /// snapshot's declared id size.
    pub fn read_id(&mut self) -> Result<u64> {
        match self.id_size {
            4 => Ok(self.read_u32()? as u64),
            8 => self.read_u64(),
            other => bail!("unsupported object id size: {other}"),
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// A sub-cursor over the next `n` bytes, advancing past them in
    /// `self`. Used to bound heap-dump (segment) records to their
    /// declared length.
    pub fn sub_cursor(&mut self, n: usize) -> Result<Cursor<'a>> {
        let slice = self.take(n)?;
        Ok(Cursor::new(slice, self.id_size))
    }
}
