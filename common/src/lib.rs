//! Phenotype Match Common Library
//!
//! 照合コア（I/Oなし）: 計測値の導出と比較、埋め込み類似度、
//! Vision レスポンスのパースと修復、ハイブリッド融合

pub mod types;
pub mod error;
pub mod landmarks;
pub mod measurements;
pub mod comparator;
pub mod similarity;
pub mod repair;
pub mod parser;
pub mod prompts;
pub mod vision;
pub mod catalog;
pub mod fusion;
pub mod regions;

pub use types::{
    Candidate, Embedding, Feature, MatchResult, MeasurementSet, QuerySignals, RawLength, Signal,
    VisionMatch, VisionVerdict, EMBEDDING_DIM,
};
pub use error::{Error, Result};
pub use landmarks::{FaceLandmarks, LandmarkPoint, Point3};
pub use measurements::{extract_measurements, MeasurementExtraction, Omission, OmittedFeature};
pub use comparator::{compare, compare_with, Comparison, MeasurementWeights};
pub use similarity::cosine;
pub use repair::repair_json;
pub use parser::{extract_json, parse_vision_response, ParsedVerdict};
pub use prompts::build_vision_prompt;
pub use vision::{resolve_verdict, VisionResolution};
pub use catalog::{Catalog, CatalogCoverage};
pub use fusion::{rank, FusionWeights, RankOptions, Ranking};
pub use regions::{RegionStyle, RegionTable};
