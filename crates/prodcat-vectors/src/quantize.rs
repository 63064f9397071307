//! uint8 vector quantization for the SQLite embedding store.
//!
//! Each component becomes one byte on a per-vector linear grid:
//! `value ≈ byte * scale + offset`. Restored values are off by at most half
//! a grid step, so cosine scores computed on restored vectors differ
//! slightly from the originals.

/// Quantized representation of one vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub bytes: Vec<u8>,
    pub scale: f32,
    pub offset: f32,
}

impl Quantized {
    /// Spread `[min, max]` of `values` over the 256 byte levels. A constant
    /// vector gets `scale = 0` and restores exactly.
    pub fn encode(values: &[f32]) -> Self {
        let Some(&first) = values.first() else {
            return Self { bytes: Vec::new(), scale: 0.0, offset: 0.0 };
        };
        let (lo, hi) = values[1..]
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        let span = hi - lo;
        if span < 1e-9 {
            return Self { bytes: vec![0; values.len()], scale: 0.0, offset: lo };
        }

        let scale = span / f32::from(u8::MAX);
        let bytes = values
            .iter()
            .map(|&v| ((v - lo) / scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        Self { bytes, scale, offset: lo }
    }

    pub fn decode(&self) -> Vec<f32> {
        decode(&self.bytes, self.scale, self.offset)
    }

    /// Largest per-component error of [`Quantized::decode`].
    pub fn max_error(&self) -> f32 {
        self.scale / 2.0
    }
}

/// Restore a vector from a stored row.
pub fn decode(bytes: &[u8], scale: f32, offset: f32) -> Vec<f32> {
    bytes.iter().map(|&b| f32::from(b) * scale + offset).collect()
}
