//! ランドマークから計測値セットを導出
//!
//! 距離を測り、比率と角度を計算する。1つの特徴量が計算できなくても
//! 抽出全体は失敗させず、その特徴量だけを省く。

use crate::landmarks::{angle_deg, FaceLandmarks, LandmarkPoint, Point3};
use crate::types::{Feature, MeasurementSet, RawLength};
use std::collections::BTreeMap;

/// 分母とみなせる最小の距離
const MIN_DENOMINATOR: f64 = 1e-9;

/// 特徴量を省いた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Omission {
    /// 必要なランドマークが検出されなかった
    MissingLandmark(LandmarkPoint),
    /// 分母が0、または腕の長さが0の角度
    DegenerateMeasurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmittedFeature {
    pub feature: Feature,
    pub reason: Omission,
}

/// 抽出結果
#[derive(Debug, Clone, Default)]
pub struct MeasurementExtraction {
    pub measurements: MeasurementSet,
    pub omitted: Vec<OmittedFeature>,
}

type Measured = std::result::Result<f64, Omission>;

struct Extractor<'a> {
    landmarks: &'a FaceLandmarks,
    features: BTreeMap<Feature, f64>,
    lengths: BTreeMap<RawLength, f64>,
    omitted: Vec<OmittedFeature>,
}

impl<'a> Extractor<'a> {
    fn point(&self, point: LandmarkPoint) -> std::result::Result<Point3, Omission> {
        self.landmarks
            .get(point)
            .ok_or(Omission::MissingLandmark(point))
    }

    fn length(&mut self, length: RawLength, a: LandmarkPoint, b: LandmarkPoint) -> Measured {
        let d = self.point(a)?.distance(&self.point(b)?);
        self.lengths.insert(length, d);
        Ok(d)
    }

    fn record(&mut self, feature: Feature, value: Measured) {
        match value {
            Ok(v) if v.is_finite() => {
                self.features.insert(feature, v);
            }
            Ok(_) => self.omitted.push(OmittedFeature {
                feature,
                reason: Omission::DegenerateMeasurement,
            }),
            Err(reason) => self.omitted.push(OmittedFeature { feature, reason }),
        }
    }

    fn angle(&self, a: LandmarkPoint, vertex: LandmarkPoint, b: LandmarkPoint) -> Measured {
        angle_deg(&self.point(a)?, &self.point(vertex)?, &self.point(b)?)
            .ok_or(Omission::DegenerateMeasurement)
    }
}

/// 比率 `num / den × scale`。分母が0なら DegenerateMeasurement
pub fn checked_ratio(num: Measured, den: Measured, scale: f64) -> Measured {
    let (num, den) = (num?, den?);
    if den.abs() < MIN_DENOMINATOR {
        return Err(Omission::DegenerateMeasurement);
    }
    Ok(num / den * scale)
}

/// ランドマークから計測値セットを抽出
pub fn extract_measurements(landmarks: &FaceLandmarks) -> MeasurementExtraction {
    use LandmarkPoint::*;

    let mut ex = Extractor {
        landmarks,
        features: BTreeMap::new(),
        lengths: BTreeMap::new(),
        omitted: Vec::new(),
    };

    let face_width = ex.length(RawLength::FaceWidth, LeftCheek, RightCheek);
    let face_height = ex.length(RawLength::FaceHeight, ForeheadTop, Menton);
    let jaw_width = ex.length(RawLength::JawWidth, LeftGonion, RightGonion);
    let inter_eye = ex.length(RawLength::InterEyeDistance, LeftEyeInner, RightEyeInner);
    // 記録のみ。比率には使わない
    let _ = ex.length(RawLength::BiocularWidth, LeftEyeOuter, RightEyeOuter);
    let nose_width = ex.length(RawLength::NoseWidth, LeftAlar, RightAlar);
    let nose_height = ex.length(RawLength::NoseHeight, Nasion, Subnasale);
    let mouth_width = ex.length(RawLength::MouthWidth, MouthLeft, MouthRight);
    let mid_face_height = ex.length(RawLength::MidFaceHeight, Nasion, Menton);

    ex.record(
        Feature::FaceWidthToHeightRatio,
        checked_ratio(face_width, face_height, 1.0),
    );
    ex.record(
        Feature::JawToFaceWidthRatio,
        checked_ratio(jaw_width, face_width, 1.0),
    );
    ex.record(
        Feature::EyeSpacingRatio,
        checked_ratio(inter_eye, face_width, 1.0),
    );
    ex.record(
        Feature::NoseWidthRatio,
        checked_ratio(nose_width, face_width, 1.0),
    );
    ex.record(
        Feature::MouthWidthRatio,
        checked_ratio(mouth_width, face_width, 1.0),
    );
    ex.record(
        Feature::FacialIndex,
        checked_ratio(mid_face_height, face_width, 100.0),
    );
    ex.record(
        Feature::NasalIndex,
        checked_ratio(nose_width, nose_height, 100.0),
    );

    let nasofrontal = ex.angle(Glabella, Nasion, NoseTip);
    ex.record(Feature::NasofrontalAngleDeg, nasofrontal);

    // 左右両方あれば平均
    let gonial = match (
        ex.angle(LeftCheek, LeftGonion, Menton),
        ex.angle(RightCheek, RightGonion, Menton),
    ) {
        (Ok(l), Ok(r)) => Ok((l + r) / 2.0),
        (Ok(v), Err(_)) | (Err(_), Ok(v)) => Ok(v),
        (Err(reason), Err(_)) => Err(reason),
    };
    ex.record(Feature::GonialAngleDeg, gonial);

    MeasurementExtraction {
        measurements: MeasurementSet::new(ex.features, ex.lengths),
        omitted: ex.omitted,
    }
}
