//! TIFF header and Image File Directory parsing.
//!
//! Works on byte slices fetched through a [`RangeSource`](crate::RangeSource)
//! rather than on a `Read + Seek` stream. Only classic (32-bit offset) TIFF
//! is handled.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CogError, Result};

/// Byte order declared by the TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffByteOrder {
    LittleEndian,
    BigEndian,
}

impl TiffByteOrder {
    #[inline]
    pub fn u16(self, b: &[u8]) -> u16 {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::read_u16(b),
            TiffByteOrder::BigEndian => BigEndian::read_u16(b),
        }
    }

    #[inline]
    pub fn u32(self, b: &[u8]) -> u32 {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::read_u32(b),
            TiffByteOrder::BigEndian => BigEndian::read_u32(b),
        }
    }

    #[inline]
    pub fn u64(self, b: &[u8]) -> u64 {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::read_u64(b),
            TiffByteOrder::BigEndian => BigEndian::read_u64(b),
        }
    }

    #[inline]
    pub fn f32(self, b: &[u8]) -> f32 {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::read_f32(b),
            TiffByteOrder::BigEndian => BigEndian::read_f32(b),
        }
    }

    #[inline]
    pub fn f64(self, b: &[u8]) -> f64 {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::read_f64(b),
            TiffByteOrder::BigEndian => BigEndian::read_f64(b),
        }
    }

    #[inline]
    pub fn write_u16(self, b: &mut [u8], v: u16) {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::write_u16(b, v),
            TiffByteOrder::BigEndian => BigEndian::write_u16(b, v),
        }
    }

    #[inline]
    pub fn write_u32(self, b: &mut [u8], v: u32) {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::write_u32(b, v),
            TiffByteOrder::BigEndian => BigEndian::write_u32(b, v),
        }
    }

    #[inline]
    pub fn write_u64(self, b: &mut [u8], v: u64) {
        match self {
            TiffByteOrder::LittleEndian => LittleEndian::write_u64(b, v),
            TiffByteOrder::BigEndian => BigEndian::write_u64(b, v),
        }
    }
}

/// Tag ids read by the COG reader.
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GDAL_NODATA: u16 = 42113;
}

/// TIFF field types.
pub mod field_type {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const SBYTE: u16 = 6;
    pub const UNDEFINED: u16 = 7;
    pub const SSHORT: u16 = 8;
    pub const SLONG: u16 = 9;
    pub const SRATIONAL: u16 = 10;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
    pub const LONG8: u16 = 16;
}

fn type_size(ty: u16) -> usize {
    use field_type::*;
    match ty {
        BYTE | ASCII | SBYTE | UNDEFINED => 1,
        SHORT | SSHORT => 2,
        LONG | SLONG | FLOAT => 4,
        RATIONAL | SRATIONAL | DOUBLE | LONG8 => 8,
        _ => 1,
    }
}

/// Size of a classic TIFF header.
pub const HEADER_LEN: usize = 8;
/// Size of one IFD entry.
pub const ENTRY_LEN: usize = 12;

/// Parsed 8-byte TIFF header.
#[derive(Debug, Clone, Copy)]
pub struct TiffHeader {
    pub byte_order: TiffByteOrder,
    pub first_ifd_offset: u64,
}

pub fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < HEADER_LEN {
        return Err(CogError::invalid("header too short"));
    }
    let byte_order = match (data[0], data[1]) {
        (b'I', b'I') => TiffByteOrder::LittleEndian,
        (b'M', b'M') => TiffByteOrder::BigEndian,
        _ => return Err(CogError::invalid("missing II/MM byte order marker")),
    };
    match byte_order.u16(&data[2..4]) {
        42 => {}
        43 => return Err(CogError::Unsupported("BigTIFF".into())),
        magic => return Err(CogError::invalid(format!("expected magic 42, got {magic}"))),
    }
    Ok(TiffHeader {
        byte_order,
        first_ifd_offset: byte_order.u32(&data[4..8]) as u64,
    })
}

/// One directory entry. Values of four bytes or fewer are stored inline in
/// `raw`; otherwise `raw` holds the file offset of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub raw: [u8; 4],
}

impl TagEntry {
    pub fn byte_len(&self) -> u64 {
        type_size(self.field_type) as u64 * self.count as u64
    }

    pub fn is_inline(&self) -> bool {
        self.byte_len() <= 4
    }

    pub fn value_offset(&self, bo: TiffByteOrder) -> u64 {
        bo.u32(&self.raw) as u64
    }
}

/// Entries of one IFD plus the offset of the next one (0 ends the chain).
#[derive(Debug, Clone)]
pub struct RawIfd {
    pub entries: Vec<TagEntry>,
    pub next_ifd_offset: u64,
}

impl RawIfd {
    pub fn entry(&self, tag: u16) -> Option<&TagEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }
}

/// Bytes needed to hold an IFD with `entry_count` entries.
pub fn ifd_len(entry_count: u16) -> usize {
    2 + entry_count as usize * ENTRY_LEN + 4
}

/// Parse an IFD from bytes starting at its offset.
pub fn parse_ifd(bo: TiffByteOrder, data: &[u8]) -> Result<RawIfd> {
    if data.len() < 2 {
        return Err(CogError::invalid("IFD too short"));
    }
    let count = bo.u16(&data[0..2]);
    let needed = ifd_len(count);
    if data.len() < needed {
        return Err(CogError::invalid(format!(
            "IFD needs {} bytes but only {} available",
            needed,
            data.len()
        )));
    }

    let entries = data[2..2 + count as usize * ENTRY_LEN]
        .chunks_exact(ENTRY_LEN)
        .map(|e| TagEntry {
            tag: bo.u16(&e[0..2]),
            field_type: bo.u16(&e[2..4]),
            count: bo.u32(&e[4..8]),
            raw: [e[8], e[9], e[10], e[11]],
        })
        .collect();

    let next = &data[needed - 4..needed];
    Ok(RawIfd {
        entries,
        next_ifd_offset: bo.u32(next) as u64,
    })
}

/// Decode unsigned integer values of a tag.
pub fn decode_u64s(bo: TiffByteOrder, entry: &TagEntry, data: &[u8]) -> Vec<u64> {
    let n = entry.count as usize;
    match entry.field_type {
        field_type::BYTE | field_type::UNDEFINED => data.iter().take(n).map(|&b| b as u64).collect(),
        field_type::SHORT => data.chunks_exact(2).take(n).map(|c| bo.u16(c) as u64).collect(),
        field_type::LONG => data.chunks_exact(4).take(n).map(|c| bo.u32(c) as u64).collect(),
        field_type::LONG8 => data.chunks_exact(8).take(n).map(|c| bo.u64(c)).collect(),
        _ => Vec::new(),
    }
}

/// Decode floating point values of a tag.
pub fn decode_f64s(bo: TiffByteOrder, entry: &TagEntry, data: &[u8]) -> Vec<f64> {
    let n = entry.count as usize;
    match entry.field_type {
        field_type::DOUBLE => data.chunks_exact(8).take(n).map(|c| bo.f64(c)).collect(),
        field_type::FLOAT => data.chunks_exact(4).take(n).map(|c| bo.f32(c) as f64).collect(),
        _ => decode_u64s(bo, entry, data).into_iter().map(|v| v as f64).collect(),
    }
}

/// Decode an ASCII tag, dropping the NUL terminator.
pub fn decode_ascii(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim().to_string()
}
