//! 計測値セット同士の類似度
//!
//! 特徴量ごとの相対差類似度を重み付き平均する。片方にしか無い特徴量は
//! 分子・分母の両方から除外し、存在する特徴量の重みだけで正規化し直す。

use crate::types::{Feature, MeasurementSet};
use serde::{Deserialize, Serialize};

/// 特徴量の重み表（合計 1.0）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeasurementWeights {
    pub face_width_to_height_ratio: f64,
    pub jaw_to_face_width_ratio: f64,
    pub eye_spacing_ratio: f64,
    pub nose_width_ratio: f64,
    pub mouth_width_ratio: f64,
    pub facial_index: f64,
    pub nasal_index: f64,
    pub nasofrontal_angle: f64,
    pub gonial_angle: f64,
}

impl Default for MeasurementWeights {
    fn default() -> Self {
        Self {
            face_width_to_height_ratio: 0.20,
            jaw_to_face_width_ratio: 0.15,
            eye_spacing_ratio: 0.12,
            nose_width_ratio: 0.12,
            mouth_width_ratio: 0.10,
            facial_index: 0.12,
            nasal_index: 0.10,
            nasofrontal_angle: 0.05,
            gonial_angle: 0.04,
        }
    }
}

impl MeasurementWeights {
    pub fn weight(&self, feature: Feature) -> f64 {
        match feature {
            Feature::FaceWidthToHeightRatio => self.face_width_to_height_ratio,
            Feature::JawToFaceWidthRatio => self.jaw_to_face_width_ratio,
            Feature::EyeSpacingRatio => self.eye_spacing_ratio,
            Feature::NoseWidthRatio => self.nose_width_ratio,
            Feature::MouthWidthRatio => self.mouth_width_ratio,
            Feature::FacialIndex => self.facial_index,
            Feature::NasalIndex => self.nasal_index,
            Feature::NasofrontalAngleDeg => self.nasofrontal_angle,
            Feature::GonialAngleDeg => self.gonial_angle,
        }
    }

    pub fn sum(&self) -> f64 {
        Feature::ALL.iter().map(|f| self.weight(*f)).sum()
    }
}

/// 比較結果
///
/// 共通の特徴量がひとつも無い場合は Incomparable（0.0 とは区別する）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    Score(f64),
    Incomparable,
}

impl Comparison {
    pub fn score(&self) -> Option<f64> {
        match self {
            Comparison::Score(s) => Some(*s),
            Comparison::Incomparable => None,
        }
    }
}

/// 1特徴量の類似度 `1 − min(|v1−v2| / max(v1,v2), 1)`
///
/// 負値や0を含む場合は絶対値の大きい方を分母に使う。
pub fn feature_similarity(v1: f64, v2: f64) -> f64 {
    if v1 == v2 {
        return 1.0;
    }
    let denom = v1.abs().max(v2.abs());
    if denom == 0.0 {
        return 1.0;
    }
    1.0 - ((v1 - v2).abs() / denom).min(1.0)
}

/// 既定の重み表で比較
pub fn compare(a: &MeasurementSet, b: &MeasurementSet) -> Comparison {
    compare_with(a, b, &MeasurementWeights::default())
}

pub fn compare_with(a: &MeasurementSet, b: &MeasurementSet, weights: &MeasurementWeights) -> Comparison {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;

    for feature in Feature::ALL {
        let w = weights.weight(feature);
        if w <= 0.0 {
            continue;
        }
        if let (Some(v1), Some(v2)) = (a.get(feature), b.get(feature)) {
            weighted += w * feature_similarity(v1, v2);
            weight_sum += w;
        }
    }

    if weight_sum == 0.0 {
        return Comparison::Incomparable;
    }
    Comparison::Score((weighted / weight_sum).clamp(0.0, 1.0))
}
