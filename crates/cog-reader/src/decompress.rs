//! Tile decompression, predictor reversal and sample conversion.

use std::io::Read;

use crate::error::{CogError, Result};
use crate::ifd::TiffByteOrder;

/// TIFF compression codes.
pub mod compression {
    pub const NONE: u16 = 1;
    pub const LZW: u16 = 5;
    pub const DEFLATE: u16 = 8;
    pub const ADOBE_DEFLATE: u16 = 32946;
}

/// TIFF sample format codes.
pub mod sample_format {
    pub const UNSIGNED_INT: u16 = 1;
    pub const SIGNED_INT: u16 = 2;
    pub const FLOAT: u16 = 3;
}

pub const PREDICTOR_NONE: u16 = 1;
pub const PREDICTOR_HORIZONTAL: u16 = 2;

/// Everything needed to turn one compressed tile into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub byte_order: TiffByteOrder,
    pub tile_width: usize,
    pub tile_height: usize,
    pub samples_per_pixel: usize,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
}

impl TileLayout {
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    pub fn decoded_len(&self) -> usize {
        self.tile_width * self.tile_height * self.samples_per_pixel * self.bytes_per_sample()
    }

    /// Reject layouts the decoder cannot handle, before any tile is fetched.
    pub fn check(&self) -> Result<()> {
        match self.compression {
            compression::NONE | compression::LZW | compression::DEFLATE | compression::ADOBE_DEFLATE => {}
            other => return Err(CogError::UnsupportedCompression(other)),
        }
        match self.predictor {
            PREDICTOR_NONE => {}
            PREDICTOR_HORIZONTAL if self.sample_format != sample_format::FLOAT => {}
            other => return Err(CogError::Unsupported(format!("predictor {other}"))),
        }
        match (self.bits_per_sample, self.sample_format) {
            (8 | 16 | 32, sample_format::UNSIGNED_INT | sample_format::SIGNED_INT)
            | (32 | 64, sample_format::FLOAT) => Ok(()),
            (bps, sf) => Err(CogError::Unsupported(format!(
                "{bps}-bit samples with sample format {sf}"
            ))),
        }
    }

    /// Decode one compressed tile into pixel-interleaved `f32` samples.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<f32>> {
        let mut raw = decompress(data, self.compression, self.decoded_len())?;
        if raw.len() < self.decoded_len() {
            return Err(CogError::Decompress(format!(
                "tile decoded to {} bytes, expected {}",
                raw.len(),
                self.decoded_len()
            )));
        }
        raw.truncate(self.decoded_len());

        if self.predictor == PREDICTOR_HORIZONTAL {
            undo_horizontal_predictor(
                &mut raw,
                self.byte_order,
                self.bytes_per_sample(),
                self.tile_width * self.samples_per_pixel,
                self.samples_per_pixel,
            );
        }
        Ok(to_f32(&raw, self.byte_order, self.bits_per_sample, self.sample_format))
    }
}

/// Decompress raw tile bytes.
pub fn decompress(data: &[u8], code: u16, expected: usize) -> Result<Vec<u8>> {
    match code {
        compression::NONE => Ok(data.to_vec()),
        compression::DEFLATE | compression::ADOBE_DEFLATE => {
            let mut out = Vec::with_capacity(expected);
            match flate2::read::ZlibDecoder::new(data).read_to_end(&mut out) {
                Ok(_) => Ok(out),
                Err(_) => {
                    // Some writers emit raw deflate without the zlib wrapper.
                    out.clear();
                    flate2::read::DeflateDecoder::new(data)
                        .read_to_end(&mut out)
                        .map_err(|e| CogError::Decompress(format!("deflate: {e}")))?;
                    Ok(out)
                }
            }
        }
        compression::LZW => weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .decode(data)
            .map_err(|e| CogError::Decompress(format!("LZW: {e}"))),
        other => Err(CogError::UnsupportedCompression(other)),
    }
}

/// Reverse horizontal differencing (predictor 2) row by row.
pub fn undo_horizontal_predictor(
    buf: &mut [u8],
    bo: TiffByteOrder,
    bytes_per_sample: usize,
    row_samples: usize,
    spp: usize,
) {
    let row_bytes = row_samples * bytes_per_sample;
    for row in buf.chunks_exact_mut(row_bytes) {
        for i in spp..row_samples {
            let (cur, prev) = (i * bytes_per_sample, (i - spp) * bytes_per_sample);
            match bytes_per_sample {
                1 => row[cur] = row[cur].wrapping_add(row[prev]),
                2 => {
                    let v = bo.u16(&row[cur..]).wrapping_add(bo.u16(&row[prev..]));
                    bo.write_u16(&mut row[cur..cur + 2], v);
                }
                4 => {
                    let v = bo.u32(&row[cur..]).wrapping_add(bo.u32(&row[prev..]));
                    bo.write_u32(&mut row[cur..cur + 4], v);
                }
                8 => {
                    let v = bo.u64(&row[cur..]).wrapping_add(bo.u64(&row[prev..]));
                    bo.write_u64(&mut row[cur..cur + 8], v);
                }
                _ => return,
            }
        }
    }
}

/// Convert decoded bytes to `f32` samples.
pub fn to_f32(raw: &[u8], bo: TiffByteOrder, bits_per_sample: u16, sf: u16) -> Vec<f32> {
    use sample_format::*;
    match (bits_per_sample, sf) {
        (8, SIGNED_INT) => raw.iter().map(|&b| b as i8 as f32).collect(),
        (8, _) => raw.iter().map(|&b| b as f32).collect(),
        (16, SIGNED_INT) => raw.chunks_exact(2).map(|c| bo.u16(c) as i16 as f32).collect(),
        (16, _) => raw.chunks_exact(2).map(|c| bo.u16(c) as f32).collect(),
        (32, FLOAT) => raw.chunks_exact(4).map(|c| bo.f32(c)).collect(),
        (32, SIGNED_INT) => raw.chunks_exact(4).map(|c| bo.u32(c) as i32 as f32).collect(),
        (32, _) => raw.chunks_exact(4).map(|c| bo.u32(c) as f32).collect(),
        (64, _) => raw.chunks_exact(8).map(|c| bo.f64(c) as f32).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LE: TiffByteOrder = TiffByteOrder::LittleEndian;

    fn layout(compression: u16, predictor: u16) -> TileLayout {
        TileLayout {
            byte_order: LE,
            tile_width: 4,
            tile_height: 2,
            samples_per_pixel: 1,
            bits_per_sample: 16,
            sample_format: sample_format::UNSIGNED_INT,
            compression,
            predictor,
        }
    }

    fn u16_bytes(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_deflate_zlib_and_raw() {
        let original = u16_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(&original).unwrap();
        let zlib = zlib.finish().unwrap();
        assert_eq!(decompress(&zlib, compression::DEFLATE, 16).unwrap(), original);

        let mut raw = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        raw.write_all(&original).unwrap();
        let raw = raw.finish().unwrap();
        assert_eq!(decompress(&raw, compression::ADOBE_DEFLATE, 16).unwrap(), original);
    }

    #[test]
    fn test_lzw() {
        let original: Vec<u8> = (0..200u32).map(|i| (i % 7) as u8).collect();
        let encoded = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&original)
            .unwrap();
        assert_eq!(decompress(&encoded, compression::LZW, original.len()).unwrap(), original);
    }

    #[test]
    fn test_horizontal_predictor_u16() {
        // rows [100, 101, 103, 90] and [7, 7, 8, 9] stored as differences
        let diffs = u16_bytes(&[100, 1, 2, 65523, 7, 0, 1, 1]);
        let values = layout(compression::NONE, PREDICTOR_HORIZONTAL).decode(&diffs).unwrap();
        assert_eq!(values, vec![100.0, 101.0, 103.0, 90.0, 7.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_short_tile_is_an_error() {
        let err = layout(compression::NONE, PREDICTOR_NONE).decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CogError::Decompress(_)));
    }

    #[test]
    fn test_layout_check() {
        assert!(layout(compression::LZW, PREDICTOR_HORIZONTAL).check().is_ok());
        assert!(matches!(
            layout(7, PREDICTOR_NONE).check(),
            Err(CogError::UnsupportedCompression(7))
        ));
        assert!(layout(compression::NONE, 3).check().is_err());
    }

    #[test]
    fn test_sample_conversion() {
        assert_eq!(to_f32(&[255, 1], LE, 8, sample_format::SIGNED_INT), vec![-1.0, 1.0]);
        assert_eq!(
            to_f32(&1.5f32.to_le_bytes(), LE, 32, sample_format::FLOAT),
            vec![1.5]
        );
        assert_eq!(
            to_f32(&[0x01, 0x00], TiffByteOrder::BigEndian, 16, sample_format::UNSIGNED_INT),
            vec![256.0]
        );
    }
}
