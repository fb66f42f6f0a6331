//! 地域名の表示用ルックアップ
//!
//! Vision の primary_region や候補の regions を表示グループ・色に対応付ける。
//! キーは小文字の前方一致で、最長一致を採用する。

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 表示グループと色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStyle {
    pub group: String,
    /// `#rrggbb`
    pub color: String,
}

/// 前方一致の地域テーブル（読み取り専用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionTable {
    entries: BTreeMap<String, RegionStyle>,
}

impl RegionTable {
    pub fn new<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, RegionStyle)>,
        K: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (normalize(k.as_ref()), v))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        }
    }

    /// 組み込みテーブル
    pub fn builtin() -> Self {
        let style = |group: &str, color: &str| RegionStyle {
            group: group.to_string(),
            color: color.to_string(),
        };
        Self::new([
            ("europe", style("Europe", "#4e79a7")),
            ("northern europe", style("Northern Europe", "#76b7b2")),
            ("southern europe", style("Southern Europe", "#59a14f")),
            ("eastern europe", style("Eastern Europe", "#8cd17d")),
            ("middle east", style("Middle East", "#f28e2b")),
            ("north africa", style("North Africa", "#ffbe7d")),
            ("africa", style("Africa", "#e15759")),
            ("sub-saharan africa", style("Sub-Saharan Africa", "#ff9d9a")),
            ("central asia", style("Central Asia", "#b6992d")),
            ("south asia", style("South Asia", "#f1ce63")),
            ("east asia", style("East Asia", "#d37295")),
            ("southeast asia", style("Southeast Asia", "#fabfd2")),
            ("oceania", style("Oceania", "#9d7660")),
            ("americas", style("Americas", "#b07aa1")),
        ])
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, RegionStyle> = serde_json::from_str(json)?;
        Ok(Self::new(raw))
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// 最長前方一致
    pub fn lookup(&self, region: &str) -> Option<&RegionStyle> {
        let key = normalize(region);
        self.entries
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, style)| style)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
