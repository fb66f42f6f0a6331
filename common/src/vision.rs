//! Vision 判定をカタログ候補に対応付ける
//!
//! LLM が返した名前を大文字小文字無視の完全一致で候補に戻す。
//! 一致しない名前は捨てて unmatched に残す（呼び出し側でログ出力）。

use crate::catalog::Catalog;
use crate::types::VisionVerdict;
use std::collections::BTreeMap;

/// 候補に対応付いた Vision の意見
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVisionMatch {
    /// 0〜1 に換算した confidence
    pub score: f64,
    /// 元の confidence（0〜100）
    pub confidence: f64,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VisionResolution {
    /// カタログ上の位置 → 意見
    pub by_candidate: BTreeMap<usize, ResolvedVisionMatch>,
    pub unmatched: Vec<String>,
}

pub fn resolve_verdict(verdict: &VisionVerdict, catalog: &Catalog) -> VisionResolution {
    let mut resolution = VisionResolution::default();

    for m in &verdict.matches {
        match catalog.position_by_name(&m.name) {
            Some(index) => {
                resolution
                    .by_candidate
                    .entry(index)
                    .or_insert_with(|| ResolvedVisionMatch {
                        score: (m.confidence / 100.0).clamp(0.0, 1.0),
                        confidence: m.confidence,
                        reasoning: m.reasoning.clone(),
                    });
            }
            None => resolution.unmatched.push(m.name.clone()),
        }
    }

    resolution
}
