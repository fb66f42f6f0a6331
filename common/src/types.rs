//! 照合で使う型定義
//!
//! - Candidate: 参照カタログの1エントリ
//! - MeasurementSet: ランドマークから導出した比率・角度
//! - Embedding: 顔埋め込みベクトル
//! - VisionVerdict: Vision LLM の分類結果
//! - MatchResult: 融合後の最終出力（候補ごと）

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 埋め込みサービスの既定次元数
pub const EMBEDDING_DIM: usize = 512;

/// 比較対象となる計測特徴量（すべてスケール不変の比率か角度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    FaceWidthToHeightRatio,
    JawToFaceWidthRatio,
    EyeSpacingRatio,
    NoseWidthRatio,
    MouthWidthRatio,
    FacialIndex,
    NasalIndex,
    NasofrontalAngleDeg,
    GonialAngleDeg,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::FaceWidthToHeightRatio,
        Feature::JawToFaceWidthRatio,
        Feature::EyeSpacingRatio,
        Feature::NoseWidthRatio,
        Feature::MouthWidthRatio,
        Feature::FacialIndex,
        Feature::NasalIndex,
        Feature::NasofrontalAngleDeg,
        Feature::GonialAngleDeg,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Feature::FaceWidthToHeightRatio => "faceWidthToHeightRatio",
            Feature::JawToFaceWidthRatio => "jawToFaceWidthRatio",
            Feature::EyeSpacingRatio => "eyeSpacingRatio",
            Feature::NoseWidthRatio => "noseWidthRatio",
            Feature::MouthWidthRatio => "mouthWidthRatio",
            Feature::FacialIndex => "facialIndex",
            Feature::NasalIndex => "nasalIndex",
            Feature::NasofrontalAngleDeg => "nasofrontalAngleDeg",
            Feature::GonialAngleDeg => "gonialAngleDeg",
        }
    }
}

/// 比率の導出にのみ使う生の距離（直接は比較しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawLength {
    FaceWidth,
    FaceHeight,
    JawWidth,
    InterEyeDistance,
    /// 両目尻間
    BiocularWidth,
    NoseWidth,
    NoseHeight,
    MouthWidth,
    MidFaceHeight,
}

/// 計測値セット
///
/// 1回の抽出内では同じ座標系で距離を測るので、比率は画像間で比較できる。
/// 生成後は変更しない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSet {
    features: BTreeMap<Feature, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    lengths: BTreeMap<RawLength, f64>,
}

impl MeasurementSet {
    /// 有限でない値は捨てる
    pub fn new(features: BTreeMap<Feature, f64>, lengths: BTreeMap<RawLength, f64>) -> Self {
        Self {
            features: features.into_iter().filter(|(_, v)| v.is_finite()).collect(),
            lengths: lengths.into_iter().filter(|(_, v)| v.is_finite()).collect(),
        }
    }

    pub fn from_features<I>(features: I) -> Self
    where
        I: IntoIterator<Item = (Feature, f64)>,
    {
        Self::new(features.into_iter().collect(), BTreeMap::new())
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.features.get(&feature).copied()
    }

    pub fn length(&self, length: RawLength) -> Option<f64> {
        self.lengths.get(&length).copied()
    }

    pub fn features(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        self.features.iter().map(|(f, v)| (*f, *v))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// 顔埋め込みベクトル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// 次元数と有限性を検証して生成
    pub fn with_dimension(values: Vec<f32>, expected: usize) -> Result<Self> {
        if values.len() != expected {
            return Err(Error::InvalidEmbeddingShape {
                expected,
                actual: values.len(),
            });
        }
        let embedding = Self(values);
        embedding.check_finite()?;
        Ok(embedding)
    }

    /// 最初の非有限値の位置を NonFiniteEmbedding として返す
    pub fn check_finite(&self) -> Result<()> {
        match self.0.iter().position(|x| !x.is_finite()) {
            Some(index) => Err(Error::NonFiniteEmbedding { index }),
            None => Ok(()),
        }
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// 類似度の根拠となるシグナル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Embedding,
    Measurement,
    Vision,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Embedding => "embedding",
            Signal::Measurement => "measurement",
            Signal::Vision => "vision",
        }
    }
}

/// 参照カタログの1エントリ（読み込み後は読み取り専用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub regions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_measurements: Option<MeasurementSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_embedding: Option<Embedding>,
}

/// Vision LLM が挙げた候補1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionMatch {
    pub name: String,

    /// LLMの自己申告（0〜100）。較正されていない
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

/// Vision LLM の分類結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionVerdict {
    pub analysis: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_region: Option<String>,

    pub matches: Vec<VisionMatch>,
}

/// 1枚のクエリ画像から得られたシグナル（どれも欠けうる）
#[derive(Debug, Clone, Default)]
pub struct QuerySignals {
    pub embedding: Option<Embedding>,
    pub measurements: Option<MeasurementSet>,
    pub vision: Option<VisionVerdict>,
}

/// 照合結果（候補ごと）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub candidate_id: String,

    pub candidate_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_similarity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_similarity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_reasoning: Option<String>,

    pub hybrid_score: f64,

    /// 1始まり、欠番なし
    pub rank: usize,

    pub contributing_signals: BTreeSet<Signal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_keys_match_serde_names() {
        for feature in Feature::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.key()));
        }
    }

    #[test]
    fn test_measurement_set_drops_non_finite() {
        let set = MeasurementSet::from_features([
            (Feature::FacialIndex, 88.0),
            (Feature::NasalIndex, f64::NAN),
            (Feature::GonialAngleDeg, f64::INFINITY),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(Feature::FacialIndex), Some(88.0));
        assert_eq!(set.get(Feature::NasalIndex), None);
    }

    #[test]
    fn test_measurement_set_deserialize() {
        let json = r#"{"features": {"facialIndex": 87.5, "gonialAngleDeg": 122.0}}"#;
        let set: MeasurementSet = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert_eq!(set.get(Feature::GonialAngleDeg), Some(122.0));
        assert_eq!(set.length(RawLength::FaceWidth), None);
    }

    #[test]
    fn test_embedding_with_dimension() {
        assert!(Embedding::with_dimension(vec![0.0; EMBEDDING_DIM], EMBEDDING_DIM).is_ok());

        let err = Embedding::with_dimension(vec![0.0; 3], EMBEDDING_DIM).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEmbeddingShape { expected: 512, actual: 3 }
        ));
    }

    #[test]
    fn test_embedding_rejects_non_finite() {
        let err = Embedding::with_dimension(vec![0.5, f32::INFINITY, 0.0], 3).unwrap_err();
        assert!(matches!(err, Error::NonFiniteEmbedding { index: 1 }));

        let err = Embedding::with_dimension(vec![f32::NAN, 0.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, Error::NonFiniteEmbedding { index: 0 }));
    }

    #[test]
    fn test_embedding_overflowing_json_is_caught() {
        // f32 に収まらない値は inf としてデシリアライズされる
        let e: Embedding = serde_json::from_str("[1e39, 0.0]").expect("デシリアライズ失敗");
        assert!(e.check_finite().is_err());
    }

    #[test]
    fn test_candidate_deserialize_minimal() {
        let json = r#"{"id": "c1", "name": "Nordid"}"#;
        let candidate: Candidate = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert_eq!(candidate.id, "c1");
        assert!(candidate.regions.is_empty());
        assert!(candidate.reference_embedding.is_none());
        assert!(candidate.reference_measurements.is_none());
    }

    #[test]
    fn test_match_result_serialize() {
        let result = MatchResult {
            candidate_id: "c1".to_string(),
            candidate_name: "Nordid".to_string(),
            embedding_similarity: Some(0.9),
            measurement_similarity: None,
            vision_confidence: None,
            vision_reasoning: None,
            hybrid_score: 0.9,
            rank: 1,
            contributing_signals: [Signal::Embedding].into_iter().collect(),
        };
        let json = serde_json::to_string(&result).expect("シリアライズ失敗");
        assert!(json.contains("\"candidateId\":\"c1\""));
        assert!(json.contains("\"contributingSignals\":[\"embedding\"]"));
        assert!(!json.contains("measurementSimilarity"));
    }
}
