//! PNG encoding for RGB image data.
//!
//! Supports two encoding modes:
//! - **Indexed PNG (color type 3)**: Used when image has ≤256 unique colors.
//! - **RGB PNG (color type 2)**: Fallback for images with >256 colors.
//!
//! Output carries only IHDR, PLTE (indexed mode), IDAT and IEND chunks.

use crate::colorize::RgbImage;
use crate::RenderError;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels to benefit from parallel palette extraction
const PARALLEL_THRESHOLD: usize = 4096;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Encode an image, choosing indexed or RGB mode by color count.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, RenderError> {
    create_png_auto(&image.pixels, image.width, image.height)
}

/// Create a PNG image with automatic format selection.
///
/// # Arguments
/// - `pixels`: RGB pixel data (3 bytes per pixel)
/// - `width`: Image width in pixels
/// - `height`: Image height in pixels
pub fn create_png_auto(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, RenderError> {
    check_dimensions(pixels, width, height)?;
    let num_pixels = pixels.len() / 3;

    let palette_result = if num_pixels >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette_sequential(pixels)
    };

    match palette_result {
        Some((palette, indices)) => create_png_indexed(width, height, &palette, &indices),
        None => create_png_rgb(pixels, width, height),
    }
}

fn check_dimensions(pixels: &[u8], width: usize, height: usize) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::EmptyImage(width, height));
    }
    let expected = width * height * 3;
    if pixels.len() != expected {
        return Err(RenderError::BufferSize {
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// Pack RGB bytes into a u32 for faster hashing and comparison
#[inline(always)]
fn pack_color(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16)
}

#[inline(always)]
fn unpack_color(packed: u32) -> (u8, u8, u8) {
    (packed as u8, (packed >> 8) as u8, (packed >> 16) as u8)
}

/// Sequential palette extraction for small images.
fn extract_palette_sequential(pixels: &[u8]) -> Option<(Vec<(u8, u8, u8)>, Vec<u8>)> {
    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<(u8, u8, u8)> = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / 3);

    for chunk in pixels.chunks_exact(3) {
        let packed = pack_color(chunk[0], chunk[1], chunk[2]);

        let index = match color_to_index.get(&packed) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push((chunk[0], chunk[1], chunk[2]));
                color_to_index.insert(packed, idx);
                idx
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Parallel palette extraction for larger images.
///
/// Unique colors are collected per chunk, merged, and then every pixel is
/// mapped to its palette index in a second parallel pass.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Vec<(u8, u8, u8)>, Vec<u8>)> {
    let chunk_pixels = (pixels.len() / 3 / rayon::current_num_threads()).max(256);
    let chunk_size = chunk_pixels * 3;

    let unique_colors: Vec<u32> = pixels
        .par_chunks(chunk_size)
        .flat_map(|chunk| {
            let mut local_colors: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE_SIZE);
            for pixel in chunk.chunks_exact(3) {
                local_colors.insert(pack_color(pixel[0], pixel[1], pixel[2]), ());
                if local_colors.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            local_colors.into_keys().collect::<Vec<_>>()
        })
        .collect();

    let mut global_colors: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<(u8, u8, u8)> = Vec::with_capacity(MAX_PALETTE_SIZE);

    for packed in unique_colors {
        if !global_colors.contains_key(&packed) {
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            global_colors.insert(packed, palette.len() as u8);
            palette.push(unpack_color(packed));
        }
    }

    let mut indices = vec![0u8; pixels.len() / 3];
    indices
        .par_chunks_mut(chunk_pixels)
        .zip(pixels.par_chunks(chunk_size))
        .for_each(|(idx_chunk, px_chunk)| {
            for (idx, px) in idx_chunk.iter_mut().zip(px_chunk.chunks_exact(3)) {
                *idx = *global_colors.get(&pack_color(px[0], px[1], px[2])).unwrap_or(&0);
            }
        });

    Some((palette, indices))
}

/// Create an indexed PNG (color type 3) from palette and indices.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[(u8, u8, u8)],
    indices: &[u8],
) -> Result<Vec<u8>, RenderError> {
    let mut png = Vec::new();
    png.extend_from_slice(&PNG_SIGNATURE);

    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

    let mut plte_data = Vec::with_capacity(palette.len() * 3);
    for (r, g, b) in palette {
        plte_data.extend_from_slice(&[*r, *g, *b]);
    }
    write_chunk(&mut png, b"PLTE", &plte_data);

    let idat_data = deflate_scanlines(indices, width, height)?;
    write_chunk(&mut png, b"IDAT", &idat_data);

    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Create a PNG image from RGB pixel data (color type 2).
pub fn create_png_rgb(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, RenderError> {
    check_dimensions(pixels, width, height)?;

    let mut png = Vec::new();
    png.extend_from_slice(&PNG_SIGNATURE);

    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 2));

    let idat_data = deflate_scanlines(pixels, width * 3, height)?;
    write_chunk(&mut png, b"IDAT", &idat_data);

    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

fn ihdr(width: usize, height: usize, color_type: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&(width as u32).to_be_bytes());
    data.extend_from_slice(&(height as u32).to_be_bytes());
    data.push(8); // bit depth
    data.push(color_type);
    data.push(0); // compression method
    data.push(0); // filter method
    data.push(0); // interlace method
    data
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Prefix each scanline with filter byte 0 and zlib-compress.
fn deflate_scanlines(data: &[u8], row_bytes: usize, height: usize) -> Result<Vec<u8>, RenderError> {
    let mut uncompressed = Vec::with_capacity(height * (1 + row_bytes));
    for row in data.chunks_exact(row_bytes).take(height) {
        uncompressed.push(0);
        uncompressed.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&uncompressed)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_palette_simple() {
        let pixels = [
            255, 0, 0, // red
            0, 255, 0, // green
            0, 0, 255, // blue
            255, 0, 0, // red again
        ];

        let (palette, indices) = extract_palette_sequential(&pixels).unwrap();
        assert_eq!(palette.len(), 3);
        assert_eq!(indices.len(), 4);
        assert_eq!(indices[0], indices[3]);
    }

    #[test]
    fn test_extract_palette_parallel_matches_sequential() {
        let mut pixels = Vec::with_capacity(128 * 128 * 3);
        for y in 0..128u32 {
            for x in 0..128u32 {
                let c = ((x / 8 + y / 8) % 50) as u8;
                pixels.extend_from_slice(&[c * 5, 100 + c * 3, 200 - c * 2]);
            }
        }

        let (palette, indices) = extract_palette_parallel(&pixels).unwrap();
        assert_eq!(palette.len(), 31);
        assert_eq!(indices.len(), 128 * 128);
        for (i, px) in pixels.chunks_exact(3).enumerate() {
            assert_eq!(palette[indices[i] as usize], (px[0], px[1], px[2]));
        }
    }

    #[test]
    fn test_too_many_colors() {
        let mut pixels = Vec::with_capacity(300 * 3);
        for i in 0..300u32 {
            pixels.extend_from_slice(&[(i % 256) as u8, (i / 256) as u8, 7]);
        }
        assert!(extract_palette_sequential(&pixels).is_none());
        assert!(create_png_auto(&pixels, 300, 1).is_ok());
    }

    #[test]
    fn test_signature_and_chunks() {
        let png = create_png_rgb(&[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(&png[0..8], &PNG_SIGNATURE);
        assert_eq!(&png[12..16], b"IHDR");
        // color type byte in IHDR
        assert_eq!(png[25], 2);
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }

    #[test]
    fn test_rejects_bad_buffer() {
        assert!(matches!(
            create_png_auto(&[0; 5], 2, 1),
            Err(RenderError::BufferSize { expected: 6, actual: 5 })
        ));
        assert!(matches!(create_png_auto(&[], 0, 0), Err(RenderError::EmptyImage(0, 0))));
    }
}
