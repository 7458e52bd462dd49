//! Pixel-wise evaluation of a parsed formula.

use crate::parser::BandRef;
use crate::{ExprError, Formula};
use rayon::prelude::*;
use scene_common::{DerivedRaster, RasterTile};

/// Evaluate `formula` over the first channel of each input tile.
///
/// A pixel is masked when it is invalid in any band the formula references
/// or when the result is NaN or infinite (division by zero included).
pub fn evaluate(
    formula: &Formula,
    band1: &RasterTile,
    band2: Option<&RasterTile>,
) -> Result<DerivedRaster, ExprError> {
    let uses_band1 = formula.expr().references(BandRef::Band1);
    let uses_band2 = formula.uses_band2();

    if uses_band2 && band2.is_none() {
        return Err(ExprError::UnboundBand);
    }
    if let Some(b2) = band2 {
        if b2.width != band1.width || b2.height != band1.height {
            return Err(ExprError::ShapeMismatch(
                band1.width,
                band1.height,
                b2.width,
                b2.height,
            ));
        }
    }

    let width = band1.width;
    let height = band1.height;
    let expr = formula.expr();
    let b1 = band1.channel(0);
    let b2 = band2.map(|t| (t.channel(0), t.valid.as_slice()));

    let mut values = vec![f64::NAN; width * height];
    let mut valid = vec![false; width * height];

    if width > 0 {
        values
            .par_chunks_mut(width)
            .zip(valid.par_chunks_mut(width))
            .enumerate()
            .for_each(|(row, (out_vals, out_valid))| {
                let base = row * width;
                for col in 0..width {
                    let idx = base + col;
                    let mut ok = !uses_band1 || band1.valid[idx];
                    let v1 = b1[idx] as f64;
                    let v2 = match b2 {
                        Some((data, mask)) => {
                            if uses_band2 {
                                ok &= mask[idx];
                            }
                            data[idx] as f64
                        }
                        None => f64::NAN,
                    };
                    if !ok {
                        continue;
                    }
                    let v = expr.eval(v1, v2);
                    if v.is_finite() {
                        out_vals[col] = v;
                        out_valid[col] = true;
                    }
                }
            });
    }

    let raster = DerivedRaster::new(width, height, values, valid);
    tracing::debug!(
        formula = formula.source(),
        valid = raster.valid_count(),
        total = width * height,
        "evaluated band formula"
    );
    Ok(raster)
}
