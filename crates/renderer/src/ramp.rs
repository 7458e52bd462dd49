//! Continuous color ramps sampled through a lookup table.

/// An RGB color with 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Interpolate between two colors; `t` is clamped to [0, 1].
pub fn interpolate_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    Rgb {
        r: lerp(c1.r, c2.r),
        g: lerp(c1.g, c2.g),
        b: lerp(c1.b, c2.b),
    }
}

/// Number of entries in a ramp's lookup table.
pub const LUT_SIZE: usize = 256;

/// A ramp defined by evenly spaced stops and sampled into a fixed table.
#[derive(Debug, Clone)]
pub struct ColorRamp {
    name: &'static str,
    lut: Vec<Rgb>,
}

/// ColorBrewer RdYlGn, 11 classes, low (red) to high (green).
const RDYLGN: [Rgb; 11] = [
    Rgb::new(165, 0, 38),
    Rgb::new(215, 48, 39),
    Rgb::new(244, 109, 67),
    Rgb::new(253, 174, 97),
    Rgb::new(254, 224, 139),
    Rgb::new(255, 255, 191),
    Rgb::new(217, 239, 139),
    Rgb::new(166, 217, 106),
    Rgb::new(102, 189, 99),
    Rgb::new(26, 152, 80),
    Rgb::new(0, 104, 55),
];

impl ColorRamp {
    /// Diverging red to yellow to green ramp.
    pub fn rdylgn() -> Self {
        Self::from_stops("RdYlGn", &RDYLGN)
    }

    /// Build a ramp from stops spread evenly over [0, 1].
    pub fn from_stops(name: &'static str, stops: &[Rgb]) -> Self {
        let lut = match stops {
            [] => vec![Rgb::BLACK; LUT_SIZE],
            [only] => vec![*only; LUT_SIZE],
            _ => {
                let segments = (stops.len() - 1) as f64;
                (0..LUT_SIZE)
                    .map(|i| {
                        let pos = i as f64 / (LUT_SIZE - 1) as f64 * segments;
                        let seg = (pos.floor() as usize).min(stops.len() - 2);
                        interpolate_color(stops[seg], stops[seg + 1], pos - seg as f64)
                    })
                    .collect()
            }
        };
        Self { name, lut }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Color for a normalized value. Values outside [0, 1] are clamped and
    /// NaN maps to the low end.
    #[inline]
    pub fn color_at(&self, t: f64) -> Rgb {
        self.lut[Self::index(t)]
    }

    #[inline]
    fn index(t: f64) -> usize {
        if t.is_nan() {
            return 0;
        }
        ((t.clamp(0.0, 1.0) * LUT_SIZE as f64) as usize).min(LUT_SIZE - 1)
    }

    pub fn lut(&self) -> &[Rgb] {
        &self.lut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let ramp = ColorRamp::rdylgn();
        assert_eq!(ramp.color_at(0.0), Rgb::new(165, 0, 38));
        assert_eq!(ramp.color_at(1.0), Rgb::new(0, 104, 55));
    }

    #[test]
    fn test_clamping() {
        let ramp = ColorRamp::rdylgn();
        assert_eq!(ramp.color_at(-3.0), ramp.color_at(0.0));
        assert_eq!(ramp.color_at(7.0), ramp.color_at(1.0));
        assert_eq!(ramp.color_at(f64::NAN), ramp.color_at(0.0));
    }

    #[test]
    fn test_midpoint_is_pale_yellow() {
        let c = ColorRamp::rdylgn().color_at(0.5);
        assert!(c.r > 240 && c.g > 240 && c.b > 170, "{:?}", c);
    }

    #[test]
    fn test_interpolate_color() {
        let c = interpolate_color(Rgb::new(0, 0, 0), Rgb::new(255, 100, 10), 0.5);
        assert_eq!(c, Rgb::new(128, 50, 5));
        assert_eq!(
            interpolate_color(Rgb::new(0, 0, 0), Rgb::new(255, 100, 10), 2.0),
            Rgb::new(255, 100, 10)
        );
    }

    #[test]
    fn test_lut_size() {
        assert_eq!(ColorRamp::rdylgn().lut().len(), LUT_SIZE);
        assert_eq!(ColorRamp::from_stops("flat", &[Rgb::new(1, 2, 3)]).color_at(0.7), Rgb::new(1, 2, 3));
    }
}
