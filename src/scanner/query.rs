//! 照合対象の顔写真を読み込み、各サービスへ送る形に整える

use crate::error::{MatchError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// 送信用に正規化したクエリ画像
#[derive(Debug, Clone)]
pub struct QueryImage {
    pub path: PathBuf,
    /// 縮小・再エンコード後のJPEGバイト列
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 元ファイルの SHA-256（16進）
    pub digest: String,
}

impl QueryImage {
    pub const MIME_TYPE: &'static str = "image/jpeg";

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// 元画像をデコードせずにバイト列から作る（テスト・再送用）
    pub fn from_jpeg_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let digest = hex::encode(Sha256::digest(&bytes));
        Self {
            path: path.into(),
            bytes,
            width: 0,
            height: 0,
            digest,
        }
    }
}

/// 画像を読み込み、長辺 `max_size` 以下に縮小してJPEGで再エンコード
pub fn load_query_image(path: &Path, max_size: u32) -> Result<QueryImage> {
    if !path.is_file() {
        return Err(MatchError::FileNotFound(path.display().to_string()));
    }

    let raw = std::fs::read(path)?;
    let digest = hex::encode(Sha256::digest(&raw));

    let image = ImageReader::new(Cursor::new(&raw))
        .with_guessed_format()?
        .decode()
        .map_err(|e| MatchError::ImageLoad(format!("{}: {}", path.display(), e)))?;

    let image = downscale(image, max_size);
    let bytes = encode_jpeg(&image)?;

    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        bytes = bytes.len(),
        "クエリ画像を正規化"
    );

    Ok(QueryImage {
        path: path.to_path_buf(),
        bytes,
        width: image.width(),
        height: image.height(),
        digest,
    })
}

fn downscale(image: DynamicImage, max_size: u32) -> DynamicImage {
    if max_size == 0 || (image.width() <= max_size && image.height() <= max_size) {
        return image;
    }
    image.thumbnail(max_size, max_size)
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    // JPEG はアルファを持てない
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| MatchError::ImageLoad(e.to_string()))?;
    Ok(buf.into_inner())
}
