//! APIレスポンスパーサー
//!
//! Vision LLM のレスポンスからJSONを抽出し、型付きの VisionVerdict に変換する。
//! 形が合わない場合は修復を試み、それでも駄目なら MalformedJson。

use crate::error::{Error, Result};
use crate::repair::{balanced_end, repair_json};
use crate::types::{VisionMatch, VisionVerdict};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

lazy_static! {
    static ref FENCE_RE: Regex = Regex::new(r"```(?:json|JSON)?[ \t]*\r?\n?").unwrap();
}

/// APIレスポンスからJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック（閉じフェンスが無ければ末尾まで）
/// 2. 最初の `{` または `[` から対応する閉じ括弧まで（閉じていなければ末尾まで）
/// 3. エラー
///
/// # Examples
/// ```
/// use phenotype_match_common::extract_json;
///
/// let response = "Result: {\"matches\": []} done";
/// assert_eq!(extract_json(response).unwrap(), "{\"matches\": []}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    let mut body = response;

    if let Some(fence) = FENCE_RE.find(response) {
        let after = &response[fence.end()..];
        body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
    }

    let start = body
        .find(['{', '['])
        .ok_or_else(|| Error::Parse("JSONが見つかりません".into()))?;
    let tail = &body[start..];

    match balanced_end(tail) {
        Some(end) => Ok(&tail[..end]),
        None => Ok(tail.trim_end()),
    }
}

/// パース済みの Vision 判定
#[derive(Debug, Clone, Default)]
pub struct ParsedVerdict {
    pub verdict: VisionVerdict,
    /// 修復を経てパースできた
    pub repaired: bool,
    /// スキーマに合わず捨てた候補数
    pub dropped_entries: usize,
}

#[derive(Deserialize)]
struct WireVerdict {
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default, alias = "primaryRegion")]
    primary_region: Option<String>,
    #[serde(default)]
    matches: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireConfidence {
    Number(f64),
    Text(String),
}

impl WireConfidence {
    fn value(&self) -> Option<f64> {
        match self {
            WireConfidence::Number(n) => Some(*n),
            WireConfidence::Text(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
struct WireMatch {
    #[serde(alias = "name")]
    phenotype: String,
    confidence: WireConfidence,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    rank: Option<u32>,
}

/// Vision レスポンスをパース
///
/// - 厳密パースに失敗したら修復を1回試す
/// - 候補は1件ずつ検証し、不正なもの（途切れた末尾要素など）は捨てる
/// - confidence は 0〜100 に丸め、同名の重複は先頭を残す
/// - `top_k` 件に切り詰める（0 なら無制限）
pub fn parse_vision_response(response: &str, top_k: usize) -> Result<ParsedVerdict> {
    let json = extract_json(response).map_err(|e| Error::MalformedJson(e.to_string()))?;

    let (value, repaired) = match serde_json::from_str::<Value>(json) {
        Ok(v) => (v, false),
        Err(strict_err) => {
            let fixed = repair_json(json).ok_or_else(|| {
                Error::MalformedJson(format!("修復不能: {}", strict_err))
            })?;
            let v = serde_json::from_str::<Value>(&fixed)
                .map_err(|e| Error::MalformedJson(e.to_string()))?;
            (v, true)
        }
    };

    let mut parsed = validate_verdict(value, top_k)?;
    parsed.repaired = repaired;
    Ok(parsed)
}

/// JSON値を VisionVerdict に変換する検証ステップ
pub fn validate_verdict(value: Value, top_k: usize) -> Result<ParsedVerdict> {
    let wire = match value {
        Value::Object(_) => serde_json::from_value::<WireVerdict>(value)
            .map_err(|e| Error::MalformedJson(format!("スキーマ不一致: {}", e)))?,
        Value::Array(matches) => WireVerdict {
            analysis: None,
            primary_region: None,
            matches,
        },
        other => {
            return Err(Error::MalformedJson(format!(
                "オブジェクトではありません: {}",
                other
            )))
        }
    };

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    let mut dropped_entries = 0;

    for entry in wire.matches {
        let Ok(m) = serde_json::from_value::<WireMatch>(entry) else {
            dropped_entries += 1;
            continue;
        };
        let name = m.phenotype.trim();
        let confidence = match m.confidence.value() {
            Some(c) if c.is_finite() && !name.is_empty() => c.clamp(0.0, 100.0),
            _ => {
                dropped_entries += 1;
                continue;
            }
        };
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        matches.push(VisionMatch {
            name: name.to_string(),
            confidence,
            reasoning: m.reasoning.filter(|r| !r.trim().is_empty()),
            rank: m.rank,
        });
    }

    if top_k > 0 {
        matches.truncate(top_k);
    }

    Ok(ParsedVerdict {
        verdict: VisionVerdict {
            analysis: wire.analysis.unwrap_or_default(),
            primary_region: wire.primary_region.filter(|r| !r.trim().is_empty()),
            matches,
        },
        repaired: false,
        dropped_entries,
    })
}
