use phenotype_match_common::{MatchResult, MeasurementSet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// シグナルごとの取得結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SignalStatus {
    Present,
    Absent { reason: String },
}

impl SignalStatus {
    pub fn absent(reason: impl Into<String>) -> Self {
        SignalStatus::Absent {
            reason: reason.into(),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, SignalStatus::Present)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalReport {
    pub landmarks: SignalStatus,
    pub embedding: SignalStatus,
    pub vision: SignalStatus,
}

/// 1枚の照合結果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub image: String,
    pub image_digest: String,
    /// RFC 3339
    pub generated_at: String,
    pub signals: SignalReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_measurements: Option<MeasurementSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_region: Option<String>,
    #[serde(default)]
    pub unmatched_vision_labels: Vec<String>,
    /// 切り詰め前の採点済み候補数
    pub scored_candidates: usize,
    pub results: Vec<MatchResult>,
}

/// フォルダ一括照合の1件分
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<MatchReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
