//! 参照カタログ
//!
//! 起動時に1回読み込み、以降は読み取り専用で複数の照合から共有する。

use crate::error::{Error, Result};
use crate::types::Candidate;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Catalog {
    candidates: Vec<Candidate>,
}

/// カタログファイルの形式（配列、または candidates キーを持つオブジェクト）
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<Candidate>),
    Wrapped { candidates: Vec<Candidate> },
}

/// シグナルごとの参照データ保有数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogCoverage {
    pub total: usize,
    pub with_embedding: usize,
    pub with_measurements: usize,
}

impl Catalog {
    /// 空カタログ・ID重複・非有限の参照埋め込みはエラー
    pub fn new(candidates: Vec<Candidate>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        let mut ids = HashSet::new();
        for c in &candidates {
            if !ids.insert(c.id.as_str()) {
                return Err(Error::DuplicateCandidate(c.id.clone()));
            }
            if let Some(e) = &c.reference_embedding {
                e.check_finite()?;
            }
        }

        Ok(Self { candidates })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let candidates = match file {
            CatalogFile::List(list) => list,
            CatalogFile::Wrapped { candidates } => candidates,
        };
        Self::new(candidates)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 参照埋め込みの次元数を検証
    pub fn validate_embedding_dim(&self, expected: usize) -> Result<()> {
        for c in &self.candidates {
            if let Some(e) = &c.reference_embedding {
                if e.dim() != expected {
                    return Err(Error::InvalidEmbeddingShape {
                        expected,
                        actual: e.dim(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Vision プロンプトに渡す候補名
    pub fn labels(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.name.as_str()).collect()
    }

    /// 名前で検索（前後空白無視・大文字小文字無視の完全一致、先頭優先）
    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        let needle = name.trim().to_lowercase();
        self.candidates
            .iter()
            .position(|c| c.name.trim().to_lowercase() == needle)
    }

    pub fn coverage(&self) -> CatalogCoverage {
        CatalogCoverage {
            total: self.candidates.len(),
            with_embedding: self
                .candidates
                .iter()
                .filter(|c| c.reference_embedding.is_some())
                .count(),
            with_measurements: self
                .candidates
                .iter()
                .filter(|c| c.reference_measurements.is_some())
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Embedding;
    use tempfile::tempdir;

    fn candidate(id: &str, name: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_catalog_is_error() {
        assert!(matches!(Catalog::new(vec![]), Err(Error::EmptyCatalog)));
    }

    #[test]
    fn test_duplicate_id_is_error() {
        let result = Catalog::new(vec![candidate("a", "One"), candidate("a", "Two")]);
        assert!(matches!(result, Err(Error::DuplicateCandidate(id)) if id == "a"));
    }

    #[test]
    fn test_from_json_list_and_wrapped() {
        let list = r#"[{"id": "n1", "name": "Nordid", "regions": ["Scandinavia"]}]"#;
        let wrapped = r#"{"candidates": [{"id": "n1", "name": "Nordid"}, {"id": "d1", "name": "Dinarid"}]}"#;

        let a = Catalog::from_json_str(list).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.candidates()[0].regions, vec!["Scandinavia".to_string()]);

        let b = Catalog::from_json_str(wrapped).unwrap();
        assert_eq!(b.labels(), vec!["Nordid", "Dinarid"]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"id": "s1", "name": "Sinid", "referenceEmbedding": [0.1, 0.2]}]"#,
        )
        .unwrap();

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.coverage().with_embedding, 1);
        assert!(catalog.validate_embedding_dim(2).is_ok());
        assert!(matches!(
            catalog.validate_embedding_dim(512),
            Err(Error::InvalidEmbeddingShape { expected: 512, actual: 2 })
        ));
    }

    #[test]
    fn test_non_finite_reference_embedding_is_error() {
        let json = r#"[
            {"id": "a", "name": "A", "referenceEmbedding": [0.6, 0.8]},
            {"id": "b", "name": "B", "referenceEmbedding": [1e39, 0.0]}
        ]"#;
        assert!(matches!(
            Catalog::from_json_str(json),
            Err(Error::NonFiniteEmbedding { index: 0 })
        ));

        let mut bad = candidate("c", "C");
        bad.reference_embedding = Some(Embedding::new(vec![0.1, f32::NAN]));
        assert!(matches!(
            Catalog::new(vec![bad]),
            Err(Error::NonFiniteEmbedding { index: 1 })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Catalog::load(Path::new("/nonexistent/catalog.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_position_by_name_case_insensitive() {
        let catalog = Catalog::new(vec![
            candidate("a", "East Baltid"),
            candidate("b", "Nordid"),
            candidate("c", "NORDID"),
        ])
        .unwrap();
        assert_eq!(catalog.position_by_name("east baltid"), Some(0));
        assert_eq!(catalog.position_by_name(" nordid "), Some(1));
        assert_eq!(catalog.position_by_name("Nord"), None);
    }

    #[test]
    fn test_coverage() {
        let mut with_emb = candidate("a", "A");
        with_emb.reference_embedding = Some(Embedding::new(vec![1.0]));
        let catalog = Catalog::new(vec![with_emb, candidate("b", "B")]).unwrap();
        assert_eq!(
            catalog.coverage(),
            CatalogCoverage {
                total: 2,
                with_embedding: 1,
                with_measurements: 0
            }
        );
    }
}
