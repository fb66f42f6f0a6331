//! 埋め込みベクトルのコサイン類似度

use crate::error::{Error, Result};
use crate::types::Embedding;

/// コサイン類似度 dot(a,b) / (‖a‖·‖b‖)
///
/// 次元数が違えば LengthMismatch、非有限値を含めば NonFiniteEmbedding。
/// どちらかがゼロベクトルなら 0.0。
pub fn cosine(a: &Embedding, b: &Embedding) -> Result<f64> {
    cosine_slices(a.as_slice(), b.as_slice())
}

pub fn cosine_slices(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (index, (&x, &y)) in a.iter().zip(b.iter()).enumerate() {
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::NonFiniteEmbedding { index });
        }
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    // 積の順序を固定して cosine(a,b) == cosine(b,a) をビット単位で保つ
    let (lo, hi) = if norm_a <= norm_b {
        (norm_a, norm_b)
    } else {
        (norm_b, norm_a)
    };
    Ok((dot / (lo.sqrt() * hi.sqrt())).clamp(-1.0, 1.0))
}
