//! ハイブリッド照合のオーケストレーション
//!
//! 3つのシグナルを並行に取得し、欠けたものは欠けたまま融合に渡す。
//! 個別シグナルの失敗・タイムアウトは縮退として扱い、全体のキャンセルと
//! 全体タイムアウトだけが照合そのものを失敗させる。

mod types;

pub use types::{BatchEntry, MatchReport, SignalReport, SignalStatus};

use crate::config::Config;
use crate::error::{MatchError, Result, OVERALL};
use crate::resilience::{guarded, RetryPolicy};
use crate::scanner::{load_query_image, QueryImage};
use crate::signals::SignalSources;
use phenotype_match_common::{
    extract_measurements, rank, Catalog, Embedding, FaceLandmarks, FusionWeights,
    MeasurementSet, MeasurementWeights, QuerySignals, RankOptions, VisionVerdict,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// 照合器の実行パラメータ
#[derive(Debug, Clone)]
pub struct MatcherOptions {
    pub landmark_timeout: Duration,
    pub embedding_timeout: Duration,
    pub vision_timeout: Duration,
    pub overall_timeout: Duration,
    pub retry: RetryPolicy,
    pub vision_top_k: usize,
    pub default_top_n: usize,
    pub max_image_size: u32,
    pub fusion_weights: FusionWeights,
    pub measurement_weights: MeasurementWeights,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl MatcherOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            landmark_timeout: config.landmark_timeout(),
            embedding_timeout: config.embedding_timeout(),
            vision_timeout: config.vision_timeout(),
            overall_timeout: config.overall_timeout(),
            retry: RetryPolicy::from_config(config),
            vision_top_k: config.vision_top_k,
            default_top_n: config.default_top_n,
            max_image_size: config.max_image_size,
            fusion_weights: config.fusion_weights,
            measurement_weights: config.measurement_weights,
        }
    }
}

/// カタログは読み込み後変更しないので、複数の照合で共有できる
pub struct HybridMatcher {
    sources: SignalSources,
    catalog: Arc<Catalog>,
    options: MatcherOptions,
}

impl HybridMatcher {
    pub fn new(sources: SignalSources, catalog: Arc<Catalog>, options: MatcherOptions) -> Self {
        Self {
            sources,
            catalog,
            options,
        }
    }

    /// 1枚の画像をカタログと照合
    ///
    /// # Errors
    /// * `Cancelled` - `cancel` が発火した（途中までの結果は破棄）
    /// * `Timeout { signal: "overall", .. }` - 全体タイムアウト
    /// * `InvalidEmbeddingShape` / `Common(..)` - 次元不一致、`NoSignalAvailable` など
    pub async fn match_image(
        &self,
        image: &QueryImage,
        top_n: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<MatchReport> {
        let overall = self.options.overall_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MatchError::Cancelled),
            result = tokio::time::timeout(overall, self.run(image, top_n, cancel)) => match result {
                Ok(r) => r,
                Err(_) => Err(MatchError::Timeout {
                    signal: OVERALL,
                    seconds: overall.as_secs(),
                }),
            },
        }
    }

    /// 画像を順に照合する。1枚ごとの失敗は記録して続行、キャンセルのみ中断
    pub async fn match_batch<F>(
        &self,
        paths: &[PathBuf],
        top_n: Option<usize>,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<Vec<BatchEntry>>
    where
        F: FnMut(usize, &Path),
    {
        let mut entries = Vec::with_capacity(paths.len());

        for (i, path) in paths.iter().enumerate() {
            on_progress(i, path);

            let outcome = match load_query_image(path, self.options.max_image_size) {
                Ok(image) => self.match_image(&image, top_n, cancel).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(report) => entries.push(BatchEntry {
                    path: path.clone(),
                    report: Some(report),
                    error: None,
                }),
                Err(MatchError::Cancelled) => return Err(MatchError::Cancelled),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "照合に失敗");
                    entries.push(BatchEntry {
                        path: path.clone(),
                        report: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(entries)
    }

    async fn run(
        &self,
        image: &QueryImage,
        top_n: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<MatchReport> {
        let started = Instant::now();
        let labels = self.catalog.labels();

        let (landmarks, embedding, vision) = tokio::join!(
            self.gather_landmarks(image, cancel),
            self.gather_embedding(image, cancel),
            self.gather_vision(image, &labels, cancel),
        );

        let (landmarks, landmark_status) = settle("landmarks", landmarks)?;
        let (embedding, embedding_status) = settle("embedding", embedding)?;
        let (vision, vision_status) = settle("vision", vision)?;

        let (measurements, landmark_status) = match landmarks.map(|l| measure(&l)) {
            Some(m) if m.is_empty() => (None, SignalStatus::absent("計測できる特徴量がありません")),
            other => (other, landmark_status),
        };

        let vision_analysis = vision
            .as_ref()
            .map(|v| v.analysis.trim().to_string())
            .filter(|a| !a.is_empty());
        let primary_region = vision.as_ref().and_then(|v| v.primary_region.clone());

        let query = QuerySignals {
            embedding,
            measurements: measurements.clone(),
            vision,
        };
        let rank_options = RankOptions {
            weights: self.options.fusion_weights,
            measurement_weights: self.options.measurement_weights,
            top_n: Some(top_n.unwrap_or(self.options.default_top_n)),
        };

        let ranking = rank(&query, &self.catalog, &rank_options)?;
        let present_signals = [&landmark_status, &embedding_status, &vision_status]
            .iter()
            .filter(|s| s.is_present())
            .count();

        for label in &ranking.unmatched_vision_labels {
            tracing::warn!(label = %label, "カタログにない Vision ラベルを無視");
        }

        tracing::info!(
            image = %image.path.display(),
            digest = %image.digest,
            results = ranking.results.len(),
            present_signals,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "照合完了"
        );

        Ok(MatchReport {
            image: image.path.display().to_string(),
            image_digest: image.digest.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            signals: SignalReport {
                landmarks: landmark_status,
                embedding: embedding_status,
                vision: vision_status,
            },
            query_measurements: measurements,
            vision_analysis,
            primary_region,
            unmatched_vision_labels: ranking.unmatched_vision_labels,
            scored_candidates: ranking.scored_candidates,
            results: ranking.results,
        })
    }

    async fn gather_landmarks(
        &self,
        image: &QueryImage,
        cancel: &CancellationToken,
    ) -> Option<Result<FaceLandmarks>> {
        let source = self.sources.landmarks.as_ref()?;
        let started = Instant::now();
        let result = guarded(
            "landmarks",
            self.options.landmark_timeout,
            &self.options.retry,
            cancel,
            || source.detect(image),
        )
        .await;
        log_elapsed("landmarks", result.is_ok(), started);
        Some(result)
    }

    async fn gather_embedding(
        &self,
        image: &QueryImage,
        cancel: &CancellationToken,
    ) -> Option<Result<Embedding>> {
        let source = self.sources.embedding.as_ref()?;
        let started = Instant::now();
        let result = guarded(
            "embedding",
            self.options.embedding_timeout,
            &self.options.retry,
            cancel,
            || source.embed(image),
        )
        .await;
        log_elapsed("embedding", result.is_ok(), started);
        Some(result)
    }

    async fn gather_vision(
        &self,
        image: &QueryImage,
        labels: &[&str],
        cancel: &CancellationToken,
    ) -> Option<Result<VisionVerdict>> {
        let source = self.sources.vision.as_ref()?;
        let started = Instant::now();
        let top_k = self.options.vision_top_k;
        let result = guarded(
            "vision",
            self.options.vision_timeout,
            &self.options.retry,
            cancel,
            || source.classify(image, labels, top_k),
        )
        .await;
        log_elapsed("vision", result.is_ok(), started);
        Some(result)
    }
}

/// 未設定・縮退はシグナル欠落として、それ以外はエラーとして返す
fn settle<T>(signal: &'static str, outcome: Option<Result<T>>) -> Result<(Option<T>, SignalStatus)> {
    match outcome {
        None => {
            tracing::debug!(signal, "シグナル未設定");
            Ok((None, SignalStatus::absent("未設定")))
        }
        Some(Ok(value)) => Ok((Some(value), SignalStatus::Present)),
        Some(Err(e)) if e.is_signal_absent() => {
            tracing::warn!(signal, error = %e, "シグナルなしで続行");
            Ok((None, SignalStatus::absent(e.to_string())))
        }
        Some(Err(e)) => Err(e),
    }
}

fn measure(landmarks: &FaceLandmarks) -> MeasurementSet {
    let extraction = extract_measurements(landmarks);
    for omitted in &extraction.omitted {
        tracing::debug!(
            feature = omitted.feature.key(),
            reason = ?omitted.reason,
            "特徴量を省略"
        );
    }
    extraction.measurements
}

fn log_elapsed(signal: &'static str, ok: bool, started: Instant) {
    tracing::debug!(
        signal,
        ok,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "シグナル取得"
    );
}
