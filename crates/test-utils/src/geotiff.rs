//! Synthetic tiled GeoTIFF writer.
//!
//! Produces small COG-shaped files (header, IFD chain with overviews, tile
//! data at the end) for exercising the COG reader without network access.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Half the Web Mercator world extent in meters.
pub const MERCATOR_EXTENT: f64 = 20037508.342789244;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Deflate,
}

impl Compression {
    fn code(self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::Lzw => 5,
            Compression::Deflate => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    F32,
}

impl SampleType {
    fn bits(self) -> u16 {
        match self {
            SampleType::U8 => 8,
            SampleType::U16 => 16,
            SampleType::F32 => 32,
        }
    }

    fn format(self) -> u16 {
        match self {
            SampleType::F32 => 3,
            _ => 1,
        }
    }
}

/// Builder for a synthetic GeoTIFF.
///
/// Pixel data passed to [`build`](Self::build) is row-major and
/// pixel-interleaved, `width * height * samples_per_pixel` values.
#[derive(Debug, Clone)]
pub struct GeoTiffBuilder {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub samples_per_pixel: u16,
    pub sample_type: SampleType,
    pub compression: Compression,
    pub predictor: bool,
    pub big_endian: bool,
    pub epsg: u16,
    /// Top-left corner in CRS units.
    pub origin: (f64, f64),
    pub pixel_size: f64,
    pub nodata: Option<f64>,
    /// Decimation factors of the overview levels, e.g. `[2, 4]`.
    pub overviews: Vec<u32>,
}

impl GeoTiffBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tile_size: 256,
            samples_per_pixel: 1,
            sample_type: SampleType::U16,
            compression: Compression::Deflate,
            predictor: false,
            big_endian: false,
            epsg: 3857,
            origin: (0.0, 0.0),
            pixel_size: 1.0,
            nodata: None,
            overviews: Vec::new(),
        }
    }

    /// Georeference the full image to cover exactly one Web Mercator tile.
    pub fn covering_mercator_tile(mut self, z: u32, x: u32, y: u32) -> Self {
        let span = 2.0 * MERCATOR_EXTENT / (1u64 << z) as f64;
        self.epsg = 3857;
        self.origin = (-MERCATOR_EXTENT + x as f64 * span, MERCATOR_EXTENT - y as f64 * span);
        self.pixel_size = span / self.width as f64;
        self
    }

    pub fn crs(mut self, epsg: u16, origin: (f64, f64), pixel_size: f64) -> Self {
        self.epsg = epsg;
        self.origin = origin;
        self.pixel_size = pixel_size;
        self
    }

    pub fn tile_size(mut self, size: u32) -> Self {
        self.tile_size = size;
        self
    }

    pub fn samples(mut self, samples_per_pixel: u16, sample_type: SampleType) -> Self {
        self.samples_per_pixel = samples_per_pixel;
        self.sample_type = sample_type;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn predictor(mut self, on: bool) -> Self {
        self.predictor = on;
        self
    }

    pub fn big_endian(mut self, on: bool) -> Self {
        self.big_endian = on;
        self
    }

    pub fn nodata(mut self, value: f64) -> Self {
        self.nodata = Some(value);
        self
    }

    pub fn overviews(mut self, factors: &[u32]) -> Self {
        self.overviews = factors.to_vec();
        self
    }

    /// Serialize `data` as a tiled GeoTIFF.
    pub fn build(&self, data: &[f32]) -> Vec<u8> {
        let spp = self.samples_per_pixel as usize;
        assert_eq!(
            data.len(),
            self.width as usize * self.height as usize * spp,
            "pixel buffer does not match dimensions"
        );
        assert!(
            !(self.predictor && self.sample_type == SampleType::F32),
            "horizontal predictor is integer-only"
        );

        let mut levels = vec![(self.width, self.height, data.to_vec())];
        for &f in &self.overviews {
            levels.push(self.decimate(data, f));
        }

        let tiles: Vec<Vec<Vec<u8>>> = levels
            .iter()
            .map(|(w, h, pixels)| self.encode_tiles(*w, *h, pixels))
            .collect();

        // First pass with placeholder offsets to size every IFD block.
        let mut blocks: Vec<Vec<Entry>> = levels
            .iter()
            .enumerate()
            .map(|(i, (w, h, _))| self.entries(i, *w, *h, &vec![0; tiles[i].len()], &tiles[i]))
            .collect();

        let mut ifd_offsets = Vec::with_capacity(blocks.len());
        let mut pos = 8u32;
        for block in &blocks {
            ifd_offsets.push(pos);
            pos += block_len(block);
        }

        let mut tile_offsets = Vec::with_capacity(tiles.len());
        for level in &tiles {
            let mut offsets = Vec::with_capacity(level.len());
            for t in level {
                offsets.push(pos);
                pos += t.len() as u32;
            }
            tile_offsets.push(offsets);
        }

        for (i, (w, h, _)) in levels.iter().enumerate() {
            blocks[i] = self.entries(i, *w, *h, &tile_offsets[i], &tiles[i]);
        }

        let mut out = Vec::with_capacity(pos as usize);
        out.extend_from_slice(if self.big_endian { b"MM" } else { b"II" });
        self.put_u16(&mut out, 42);
        self.put_u32(&mut out, 8);

        for (i, block) in blocks.iter().enumerate() {
            let next = ifd_offsets.get(i + 1).copied().unwrap_or(0);
            self.write_ifd(&mut out, block, ifd_offsets[i], next);
        }
        for level in &tiles {
            for t in level {
                out.extend_from_slice(t);
            }
        }
        out
    }

    /// Build and write to `dir/name`.
    pub fn write_to(&self, data: &[f32], dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build(data)).expect("write GeoTIFF");
        path
    }

    fn decimate(&self, data: &[f32], factor: u32) -> (u32, u32, Vec<f32>) {
        let spp = self.samples_per_pixel as usize;
        let w = self.width.div_ceil(factor);
        let h = self.height.div_ceil(factor);
        let mut out = Vec::with_capacity(w as usize * h as usize * spp);
        for row in 0..h {
            for col in 0..w {
                let src = ((row * factor) as usize * self.width as usize + (col * factor) as usize) * spp;
                out.extend_from_slice(&data[src..src + spp]);
            }
        }
        (w, h, out)
    }

    fn encode_tiles(&self, width: u32, height: u32, pixels: &[f32]) -> Vec<Vec<u8>> {
        let spp = self.samples_per_pixel as usize;
        let ts = self.tile_size;
        let fill = self.nodata.unwrap_or(0.0) as f32;
        let mut tiles = Vec::new();

        for ty in 0..height.div_ceil(ts) {
            for tx in 0..width.div_ceil(ts) {
                let mut samples = Vec::with_capacity((ts * ts) as usize * spp);
                for r in 0..ts {
                    for c in 0..ts {
                        let (x, y) = (tx * ts + c, ty * ts + r);
                        for s in 0..spp {
                            samples.push(if x < width && y < height {
                                pixels[(y as usize * width as usize + x as usize) * spp + s]
                            } else {
                                fill
                            });
                        }
                    }
                }
                tiles.push(self.compress(&self.sample_bytes(&samples)));
            }
        }
        tiles
    }

    fn sample_bytes(&self, samples: &[f32]) -> Vec<u8> {
        let row = (self.tile_size as usize) * self.samples_per_pixel as usize;
        let spp = self.samples_per_pixel as usize;
        match self.sample_type {
            SampleType::U8 => {
                let mut v: Vec<u8> = samples.iter().map(|&s| s as u8).collect();
                if self.predictor {
                    for line in v.chunks_exact_mut(row) {
                        for i in (spp..row).rev() {
                            line[i] = line[i].wrapping_sub(line[i - spp]);
                        }
                    }
                }
                v
            }
            SampleType::U16 => {
                let mut v: Vec<u16> = samples.iter().map(|&s| s as u16).collect();
                if self.predictor {
                    for line in v.chunks_exact_mut(row) {
                        for i in (spp..row).rev() {
                            line[i] = line[i].wrapping_sub(line[i - spp]);
                        }
                    }
                }
                let mut out = Vec::with_capacity(v.len() * 2);
                for s in v {
                    self.put_u16(&mut out, s);
                }
                out
            }
            SampleType::F32 => {
                let mut out = Vec::with_capacity(samples.len() * 4);
                for &s in samples {
                    self.put_u32(&mut out, s.to_bits());
                }
                out
            }
        }
    }

    fn compress(&self, raw: &[u8]) -> Vec<u8> {
        match self.compression {
            Compression::None => raw.to_vec(),
            Compression::Deflate => {
                let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(raw).expect("deflate");
                enc.finish().expect("deflate")
            }
            Compression::Lzw => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .encode(raw)
                .expect("lzw"),
        }
    }

    fn entries(&self, level: usize, width: u32, height: u32, offsets: &[u32], tiles: &[Vec<u8>]) -> Vec<Entry> {
        let spp = self.samples_per_pixel;
        let mut e = Vec::new();
        if level > 0 {
            e.push(Entry::long(254, vec![1]));
        }
        e.push(Entry::long(256, vec![width]));
        e.push(Entry::long(257, vec![height]));
        e.push(Entry::short(258, vec![self.sample_type.bits(); spp as usize]));
        e.push(Entry::short(259, vec![self.compression.code()]));
        e.push(Entry::short(262, vec![if spp >= 3 { 2 } else { 1 }]));
        e.push(Entry::short(277, vec![spp]));
        e.push(Entry::short(284, vec![1]));
        if self.predictor {
            e.push(Entry::short(317, vec![2]));
        }
        e.push(Entry::long(322, vec![self.tile_size]));
        e.push(Entry::long(323, vec![self.tile_size]));
        e.push(Entry::long(324, offsets.to_vec()));
        e.push(Entry::long(325, tiles.iter().map(|t| t.len() as u32).collect()));
        e.push(Entry::short(339, vec![self.sample_type.format(); spp as usize]));

        if level == 0 {
            let geographic = self.epsg == 4326;
            e.push(Entry::double(33550, vec![self.pixel_size, self.pixel_size, 0.0]));
            e.push(Entry::double(33922, vec![0.0, 0.0, 0.0, self.origin.0, self.origin.1, 0.0]));
            e.push(Entry::short(
                34735,
                vec![
                    1, 1, 0, 3, //
                    1024, 0, 1, if geographic { 2 } else { 1 }, //
                    1025, 0, 1, 1, //
                    if geographic { 2048 } else { 3072 }, 0, 1, self.epsg,
                ],
            ));
            if let Some(nd) = self.nodata {
                e.push(Entry::ascii(42113, &format!("{nd}")));
            }
        }
        e
    }

    fn write_ifd(&self, out: &mut Vec<u8>, entries: &[Entry], ifd_offset: u32, next: u32) {
        debug_assert_eq!(out.len() as u32, ifd_offset);
        let mut external = ifd_offset + 2 + 12 * entries.len() as u32 + 4;
        let mut ext_bytes = Vec::new();

        self.put_u16(out, entries.len() as u16);
        for entry in entries {
            let bytes = entry.value.bytes(self);
            self.put_u16(out, entry.tag);
            self.put_u16(out, entry.value.type_id());
            self.put_u32(out, entry.value.count());
            if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                out.extend_from_slice(&inline);
            } else {
                self.put_u32(out, external);
                ext_bytes.extend_from_slice(&bytes);
                if bytes.len() % 2 == 1 {
                    ext_bytes.push(0);
                }
                external += padded(bytes.len()) as u32;
            }
        }
        self.put_u32(out, next);
        out.extend_from_slice(&ext_bytes);
    }

    fn put_u16(&self, out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() });
    }

    fn put_u32(&self, out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() });
    }

    fn put_f64(&self, out: &mut Vec<u8>, v: f64) {
        out.extend_from_slice(&if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() });
    }
}

struct Entry {
    tag: u16,
    value: Value,
}

enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Ascii(Vec<u8>),
}

impl Entry {
    fn short(tag: u16, v: Vec<u16>) -> Self {
        Self { tag, value: Value::Short(v) }
    }

    fn long(tag: u16, v: Vec<u32>) -> Self {
        Self { tag, value: Value::Long(v) }
    }

    fn double(tag: u16, v: Vec<f64>) -> Self {
        Self { tag, value: Value::Double(v) }
    }

    fn ascii(tag: u16, s: &str) -> Self {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        Self { tag, value: Value::Ascii(bytes) }
    }
}

impl Value {
    fn type_id(&self) -> u16 {
        match self {
            Value::Ascii(_) => 2,
            Value::Short(_) => 3,
            Value::Long(_) => 4,
            Value::Double(_) => 12,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Value::Short(v) => v.len() as u32,
            Value::Long(v) => v.len() as u32,
            Value::Double(v) => v.len() as u32,
            Value::Ascii(v) => v.len() as u32,
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            Value::Short(v) => v.len() * 2,
            Value::Long(v) => v.len() * 4,
            Value::Double(v) => v.len() * 8,
            Value::Ascii(v) => v.len(),
        }
    }

    fn bytes(&self, b: &GeoTiffBuilder) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        match self {
            Value::Short(v) => v.iter().for_each(|&x| b.put_u16(&mut out, x)),
            Value::Long(v) => v.iter().for_each(|&x| b.put_u32(&mut out, x)),
            Value::Double(v) => v.iter().for_each(|&x| b.put_f64(&mut out, x)),
            Value::Ascii(v) => out.extend_from_slice(v),
        }
        out
    }
}

fn padded(len: usize) -> usize {
    len + len % 2
}

fn block_len(entries: &[Entry]) -> u32 {
    let external: usize = entries
        .iter()
        .map(|e| e.value.byte_len())
        .filter(|&n| n > 4)
        .map(padded)
        .sum();
    (2 + 12 * entries.len() + 4 + external) as u32
}
