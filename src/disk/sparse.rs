//! Android sparse image decoder.
//!
//! Layout: a 28 byte file header followed by `total_chunks` chunks, each with
//! a 12 byte chunk header. All fields are little endian.

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use std::io::{self, Read, Seek, SeekFrom, Write};

pub const SPARSE_HEADER_MAGIC: u32 = 0xED26_FF3A;
const MAJOR_VERSION: u16 = 1;
const FILE_HEADER_LEN: usize = 28;
const CHUNK_HEADER_LEN: usize = 12;

const CHUNK_TYPE_RAW: u16 = 0xCAC1;
const CHUNK_TYPE_FILL: u16 = 0xCAC2;
const CHUNK_TYPE_DONT_CARE: u16 = 0xCAC3;
const CHUNK_TYPE_CRC32: u16 = 0xCAC4;

const COPY_BUF_LEN: usize = 64 * 1024;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub file_hdr_sz: u16,
    pub chunk_hdr_sz: u16,
    pub blk_sz: u32,
    pub total_blks: u32,
    pub total_chunks: u32,
    pub image_checksum: u32,
}

impl SparseHeader {
    pub fn parse(buf: &[u8; FILE_HEADER_LEN]) -> Result<Self> {
        let magic = le_u32(&buf[0..4]);
        if magic != SPARSE_HEADER_MAGIC {
            bail!("not a sparse image (magic {magic:#010x})");
        }
        let header = Self {
            major_version: le_u16(&buf[4..6]),
            minor_version: le_u16(&buf[6..8]),
            file_hdr_sz: le_u16(&buf[8..10]),
            chunk_hdr_sz: le_u16(&buf[10..12]),
            blk_sz: le_u32(&buf[12..16]),
            total_blks: le_u32(&buf[16..20]),
            total_chunks: le_u32(&buf[20..24]),
            image_checksum: le_u32(&buf[24..28]),
        };
        if header.major_version != MAJOR_VERSION {
            bail!("unsupported sparse major version {}", header.major_version);
        }
        if (header.file_hdr_sz as usize) < FILE_HEADER_LEN
            || (header.chunk_hdr_sz as usize) < CHUNK_HEADER_LEN
        {
            bail!("sparse header sizes too small");
        }
        if header.blk_sz == 0 || !header.blk_sz.is_multiple_of(4) {
            bail!("invalid sparse block size {}", header.blk_sz);
        }
        Ok(header)
    }

    /// Size of the image once expanded.
    pub fn expanded_len(&self) -> u64 {
        self.total_blks as u64 * self.blk_sz as u64
    }
}

/// Expand a sparse image from `reader` into `writer`, which must hold at least
/// `capacity` bytes. Returns the expanded length.
pub fn unsparse<R: Read, W: Write + Seek>(
    reader: &mut R,
    writer: &mut W,
    capacity: u64,
    mut on_progress: impl FnMut(u64),
) -> Result<u64> {
    let mut buf = [0u8; FILE_HEADER_LEN];
    reader
        .read_exact(&mut buf)
        .context("failed to read sparse header")?;
    let header = SparseHeader::parse(&buf)?;
    skip(reader, header.file_hdr_sz as u64 - FILE_HEADER_LEN as u64)?;

    if header.expanded_len() > capacity {
        bail!(
            "sparse image expands to {} bytes, partition holds {}",
            header.expanded_len(),
            capacity
        );
    }

    let blk_sz = header.blk_sz as u64;
    let mut digest = CRC32.digest();
    let mut blocks: u64 = 0;
    let mut data = vec![0u8; COPY_BUF_LEN];

    for chunk_idx in 0..header.total_chunks {
        let mut chunk = [0u8; CHUNK_HEADER_LEN];
        reader
            .read_exact(&mut chunk)
            .with_context(|| format!("failed to read sparse chunk {chunk_idx}"))?;
        skip(reader, header.chunk_hdr_sz as u64 - CHUNK_HEADER_LEN as u64)?;

        let chunk_type = le_u16(&chunk[0..2]);
        let chunk_blocks = le_u32(&chunk[4..8]) as u64;
        let total_sz = le_u32(&chunk[8..12]) as u64;
        let payload = total_sz
            .checked_sub(header.chunk_hdr_sz as u64)
            .with_context(|| format!("sparse chunk {chunk_idx} shorter than its header"))?;
        let out_len = chunk_blocks * blk_sz;

        if chunk_type != CHUNK_TYPE_CRC32 && blocks + chunk_blocks > header.total_blks as u64 {
            bail!("sparse chunk {chunk_idx} runs past the declared block count");
        }

        match chunk_type {
            CHUNK_TYPE_RAW => {
                if payload != out_len {
                    bail!("sparse raw chunk {chunk_idx} has {payload} bytes, expected {out_len}");
                }
                let mut remain = out_len;
                while remain > 0 {
                    let n = remain.min(COPY_BUF_LEN as u64) as usize;
                    reader.read_exact(&mut data[..n])?;
                    digest.update(&data[..n]);
                    writer.write_all(&data[..n])?;
                    remain -= n as u64;
                    on_progress(n as u64);
                }
            }
            CHUNK_TYPE_FILL => {
                if payload != 4 {
                    bail!("sparse fill chunk {chunk_idx} has {payload} payload bytes");
                }
                let mut fill = [0u8; 4];
                reader.read_exact(&mut fill)?;
                for (i, b) in data.iter_mut().enumerate() {
                    *b = fill[i % 4];
                }
                let mut remain = out_len;
                while remain > 0 {
                    let n = remain.min(COPY_BUF_LEN as u64) as usize;
                    digest.update(&data[..n]);
                    writer.write_all(&data[..n])?;
                    remain -= n as u64;
                    on_progress(n as u64);
                }
            }
            CHUNK_TYPE_DONT_CARE => {
                if payload != 0 {
                    bail!("sparse don't-care chunk {chunk_idx} carries data");
                }
                data.fill(0);
                let mut remain = out_len;
                while remain > 0 {
                    let n = remain.min(COPY_BUF_LEN as u64) as usize;
                    digest.update(&data[..n]);
                    remain -= n as u64;
                }
                writer.seek(SeekFrom::Current(out_len as i64))?;
                on_progress(out_len);
            }
            CHUNK_TYPE_CRC32 => {
                if payload != 4 {
                    bail!("sparse crc chunk {chunk_idx} has {payload} payload bytes");
                }
                let mut value = [0u8; 4];
                reader.read_exact(&mut value)?;
                let expected = u32::from_le_bytes(value);
                let actual = digest.clone().finalize();
                if expected != actual {
                    bail!("sparse crc mismatch: expected {expected:#010x}, got {actual:#010x}");
                }
                continue;
            }
            other => bail!("unknown sparse chunk type {other:#06x}"),
        }
        blocks += chunk_blocks;
    }

    writer.flush()?;
    Ok(blocks * blk_sz)
}

/// Peek at the first four bytes of a file for the sparse magic.
pub fn is_sparse<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) => Ok(u32::from_le_bytes(magic) == SPARSE_HEADER_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn skip<R: Read>(reader: &mut R, len: u64) -> io::Result<()> {
    if len > 0 {
        io::copy(&mut reader.take(len), &mut io::sink())?;
    }
    Ok(())
}

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
