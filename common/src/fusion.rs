//! ハイブリッド融合とランキング
//!
//! 候補ごとに利用可能なシグナルだけで重みを正規化し直した加重平均を
//! hybridScore とする。シグナルがひとつも無い候補はランキングから除外する。
//!
//! 並び順: hybridScore 降順 → Vision あり優先 → 埋め込み類似度降順 → カタログ順

use crate::catalog::Catalog;
use crate::comparator::{compare_with, MeasurementWeights};
use crate::error::{Error, Result};
use crate::similarity::cosine;
use crate::types::{Candidate, MatchResult, QuerySignals, Signal};
use crate::vision::{resolve_verdict, ResolvedVisionMatch, VisionResolution};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// シグナル間の相対重み
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FusionWeights {
    pub vision: f64,
    pub embedding: f64,
    pub measurement: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vision: 0.5,
            embedding: 0.3,
            measurement: 0.2,
        }
    }
}

impl FusionWeights {
    /// 各重みは有限かつ正
    pub fn validate(&self) -> Result<()> {
        for (signal, w) in [
            (Signal::Vision, self.vision),
            (Signal::Embedding, self.embedding),
            (Signal::Measurement, self.measurement),
        ] {
            if !w.is_finite() || w <= 0.0 {
                return Err(Error::Config(format!(
                    "fusion weight for {} must be positive, got {}",
                    signal.as_str(),
                    w
                )));
            }
        }
        Ok(())
    }

    pub fn weight(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Vision => self.vision,
            Signal::Embedding => self.embedding,
            Signal::Measurement => self.measurement,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    pub weights: FusionWeights,
    pub measurement_weights: MeasurementWeights,
    /// 上位N件に切り詰める（None または 0 なら全件）
    pub top_n: Option<usize>,
}

/// ランキング結果
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub results: Vec<MatchResult>,
    /// カタログに対応付かなかった Vision のラベル
    pub unmatched_vision_labels: Vec<String>,
    /// 少なくとも1つのシグナルで採点できた候補数（切り詰め前）
    pub scored_candidates: usize,
}

#[derive(Debug)]
struct Scored<'a> {
    index: usize,
    candidate: &'a Candidate,
    embedding: Option<f64>,
    measurement: Option<f64>,
    vision: Option<&'a ResolvedVisionMatch>,
    hybrid: f64,
}

impl Scored<'_> {
    fn signals(&self) -> BTreeSet<Signal> {
        let mut set = BTreeSet::new();
        if self.embedding.is_some() {
            set.insert(Signal::Embedding);
        }
        if self.measurement.is_some() {
            set.insert(Signal::Measurement);
        }
        if self.vision.is_some() {
            set.insert(Signal::Vision);
        }
        set
    }
}

/// 存在するシグナルだけで正規化した加重平均
///
/// 埋め込みは負の類似度を 0 として扱う。
pub fn hybrid_score(
    embedding: Option<f64>,
    measurement: Option<f64>,
    vision: Option<f64>,
    weights: &FusionWeights,
) -> Option<f64> {
    let parts = [
        (Signal::Embedding, embedding.map(|s| s.max(0.0))),
        (Signal::Measurement, measurement),
        (Signal::Vision, vision),
    ];

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (signal, value) in parts {
        if let Some(v) = value {
            let w = weights.weight(signal);
            weighted += w * v;
            weight_sum += w;
        }
    }

    if weight_sum == 0.0 {
        return None;
    }
    Some((weighted / weight_sum).clamp(0.0, 1.0))
}

fn score_candidate<'a>(
    index: usize,
    candidate: &'a Candidate,
    query: &QuerySignals,
    vision: &'a VisionResolution,
    options: &RankOptions,
) -> Result<Option<Scored<'a>>> {
    let embedding = match (&query.embedding, &candidate.reference_embedding) {
        (Some(q), Some(r)) => Some(cosine(q, r)?),
        _ => None,
    };

    let measurement = match (&query.measurements, &candidate.reference_measurements) {
        (Some(q), Some(r)) => compare_with(q, r, &options.measurement_weights).score(),
        _ => None,
    };

    let vision = vision.by_candidate.get(&index);

    let Some(hybrid) = hybrid_score(
        embedding,
        measurement,
        vision.map(|v| v.score),
        &options.weights,
    ) else {
        return Ok(None);
    };

    Ok(Some(Scored {
        index,
        candidate,
        embedding,
        measurement,
        vision,
        hybrid,
    }))
}

fn compare_scored(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.hybrid
        .total_cmp(&a.hybrid)
        .then_with(|| b.vision.is_some().cmp(&a.vision.is_some()))
        .then_with(|| match (a.embedding, b.embedding) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.index.cmp(&b.index))
}

/// クエリのシグナルをカタログ全候補と突き合わせてランキングする
///
/// # Errors
/// * `LengthMismatch` - クエリと参照の埋め込み次元が異なる
/// * `NoSignalAvailable` - どの候補にもシグナルが1つも無い
pub fn rank(query: &QuerySignals, catalog: &Catalog, options: &RankOptions) -> Result<Ranking> {
    let vision = query
        .vision
        .as_ref()
        .map(|v| resolve_verdict(v, catalog))
        .unwrap_or_default();

    // collect は順序を保つので結果は決定的
    let scored: Vec<Option<Scored<'_>>> = catalog
        .candidates()
        .par_iter()
        .enumerate()
        .map(|(index, candidate)| score_candidate(index, candidate, query, &vision, options))
        .collect::<Result<Vec<_>>>()?;

    let mut scored: Vec<Scored<'_>> = scored.into_iter().flatten().collect();
    if scored.is_empty() {
        return Err(Error::NoSignalAvailable);
    }
    scored.sort_by(compare_scored);

    let scored_candidates = scored.len();
    if let Some(n) = options.top_n.filter(|n| *n > 0) {
        scored.truncate(n);
    }

    let results = scored
        .into_iter()
        .enumerate()
        .map(|(pos, s)| MatchResult {
            candidate_id: s.candidate.id.clone(),
            candidate_name: s.candidate.name.clone(),
            embedding_similarity: s.embedding,
            measurement_similarity: s.measurement,
            vision_confidence: s.vision.map(|v| v.confidence),
            vision_reasoning: s.vision.and_then(|v| v.reasoning.clone()),
            hybrid_score: s.hybrid,
            rank: pos + 1,
            contributing_signals: s.signals(),
        })
        .collect();

    Ok(Ranking {
        results,
        unmatched_vision_labels: vision.unmatched,
        scored_candidates,
    })
}
