use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use phenotype_match::{cli, config, matcher, scanner, signals};
use phenotype_match_common::{Catalog, RegionTable};
use cli::{Cli, Commands, OutputFormat};
use config::Config;
use matcher::{HybridMatcher, MatchReport, MatcherOptions, SignalStatus};
use signals::SignalSources;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path)
        .with_context(|| format!("設定の読み込みに失敗: {}", config_path.display()))?;

    match cli.command {
        Commands::Match { image, catalog, top_n, output, format, no_vision } => {
            let matcher = build_matcher(&config, &catalog, no_vision)?;
            let query = scanner::load_query_image(&image, config.max_image_size)?;

            let cancel = cancel_on_ctrl_c();
            let spinner = spinner(&format!("照合中: {}", image.display()))?;
            let result = matcher.match_image(&query, top_n, &cancel).await;
            spinner.finish_and_clear();
            let report = result?;

            match output {
                Some(path) => {
                    write_json(&path, &report)?;
                    println!("✔ 結果を保存: {}", path.display());
                }
                None => match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                    OutputFormat::Table => print_report(&report),
                },
            }
        }

        Commands::Batch { folder, catalog, output, top_n, no_vision } => {
            println!("🔍 phenotype-match - 一括照合\n");

            println!("[1/3] 写真をスキャン中...");
            let images = scanner::scan_folder(&folder)?;
            println!("✔ {}枚の写真を検出\n", images.len());
            if images.is_empty() {
                anyhow::bail!("画像が見つかりません: {}", folder.display());
            }

            println!("[2/3] 照合中...");
            let matcher = build_matcher(&config, &catalog, no_vision)?;
            let paths: Vec<PathBuf> = images.into_iter().map(|i| i.path).collect();
            let total = paths.len();

            let cancel = cancel_on_ctrl_c();
            let spinner = spinner("照合中")?;
            let entries = matcher
                .match_batch(&paths, top_n, &cancel, |i, path| {
                    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                    spinner.set_message(format!("[{}/{}] {}", i + 1, total, name));
                })
                .await;
            spinner.finish_and_clear();
            let entries = entries?;

            let failed = entries.iter().filter(|e| e.error.is_some()).count();
            println!("✔ 照合完了（成功 {} / 失敗 {}）\n", entries.len() - failed, failed);

            println!("[3/3] 結果を保存中...");
            let output = output.unwrap_or_else(|| folder.join("matches.json"));
            write_json(&output, &entries)?;
            println!("✔ 結果を保存: {}", output.display());
        }

        Commands::Catalog { file } => {
            let catalog = Catalog::load(&file)
                .with_context(|| format!("カタログの読み込みに失敗: {}", file.display()))?;
            let coverage = catalog.coverage();

            println!("カタログ: {}", file.display());
            println!("  候補数: {}", coverage.total);
            println!("  参照埋め込みあり: {}", coverage.with_embedding);
            println!("  参照計測値あり: {}", coverage.with_measurements);
            if let Err(e) = catalog.validate_embedding_dim(config.embedding_dim) {
                println!("  ⚠ {}", e);
            }
            for candidate in catalog.candidates() {
                println!("  - {} ({}) [{}]", candidate.name, candidate.id, candidate.regions.join(", "));
            }
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.api_key = Some(key);
                config.save_to(&config_path)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定: {}", config_path.display());
                println!("  Visionモデル: {}", config.vision_model);
                println!("  Visionエンドポイント: {}", config.vision_endpoint);
                println!("  ランドマーク: {}", config.landmark_endpoint);
                println!("  埋め込み: {} ({}次元)", config.embedding_endpoint, config.embedding_dim);
                println!(
                    "  タイムアウト: ランドマーク {}s / 埋め込み {}s / Vision {}s / 全体 {}s",
                    config.landmark_timeout_secs,
                    config.embedding_timeout_secs,
                    config.vision_timeout_secs,
                    config.overall_timeout_secs
                );
                println!(
                    "  融合重み: vision {} / embedding {} / measurement {}",
                    config.fusion_weights.vision,
                    config.fusion_weights.embedding,
                    config.fusion_weights.measurement
                );
                println!("  最大画像サイズ: {}px", config.max_image_size);
                println!("  APIキー: {}", if config.get_api_key().is_ok() { "設定済み" } else { "未設定" });
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_matcher(config: &Config, catalog_path: &Path, no_vision: bool) -> anyhow::Result<HybridMatcher> {
    let catalog = Catalog::load(catalog_path)
        .with_context(|| format!("カタログの読み込みに失敗: {}", catalog_path.display()))?;
    catalog.validate_embedding_dim(config.embedding_dim)?;

    let mut sources = SignalSources::from_config(config)?;
    if no_vision {
        sources.vision = None;
    }

    Ok(HybridMatcher::new(
        sources,
        Arc::new(catalog),
        MatcherOptions::from_config(config),
    ))
}

/// Ctrl-C で照合全体をキャンセル
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("中断を受け付けました");
            child.cancel();
        }
    });
    token
}

fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("書き込みに失敗: {}", path.display()))?;
    Ok(())
}

fn status_label(status: &SignalStatus) -> String {
    match status {
        SignalStatus::Present => "✔".to_string(),
        SignalStatus::Absent { reason } => format!("✘ ({})", reason),
    }
}

fn print_report(report: &MatchReport) {
    let regions = RegionTable::builtin();

    println!("画像: {} ({})", report.image, &report.image_digest[..report.image_digest.len().min(12)]);
    println!("  ランドマーク: {}", status_label(&report.signals.landmarks));
    println!("  埋め込み: {}", status_label(&report.signals.embedding));
    println!("  Vision: {}", status_label(&report.signals.vision));
    if let Some(region) = &report.primary_region {
        let group = regions.lookup(region).map(|s| s.group.as_str()).unwrap_or("-");
        println!("  推定地域: {} [{}]", region, group);
    }
    if let Some(analysis) = &report.vision_analysis {
        println!("  所見: {}", analysis);
    }
    println!();

    let fmt = |v: Option<f64>| v.map(|s| format!("{:.3}", s)).unwrap_or_else(|| "-".to_string());
    println!("{:>4}  {:<24} {:>7} {:>7} {:>7} {:>7}", "順位", "候補", "総合", "埋込", "計測", "Vision");
    for r in &report.results {
        println!(
            "{:>4}  {:<24} {:>7.3} {:>7} {:>7} {:>7}",
            r.rank,
            r.candidate_name,
            r.hybrid_score,
            fmt(r.embedding_similarity),
            fmt(r.measurement_similarity),
            r.vision_confidence.map(|c| format!("{:.0}", c)).unwrap_or_else(|| "-".to_string()),
        );
    }

    if !report.unmatched_vision_labels.is_empty() {
        println!("\n⚠ カタログにないラベル: {}", report.unmatched_vision_labels.join(", "));
    }
}
