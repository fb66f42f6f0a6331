//! 顔ランドマーク
//!
//! ランドマークサービスが返す名前付き3D点と、距離・角度の幾何計算

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 正規化画像空間上の3D点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Point3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    fn sub(&self, other: &Point3) -> (f64, f64, f64) {
        (self.x - other.x, self.y - other.y, self.z - other.z)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// 計測に使う名前付きランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkPoint {
    ForeheadTop,
    Glabella,
    Nasion,
    NoseTip,
    Subnasale,
    LeftAlar,
    RightAlar,
    LeftEyeInner,
    RightEyeInner,
    LeftEyeOuter,
    RightEyeOuter,
    LeftCheek,
    RightCheek,
    LeftGonion,
    RightGonion,
    MouthLeft,
    MouthRight,
    Menton,
}

/// 1つの顔のランドマーク集合
///
/// 未知の名前はデシリアライズ時に無視される。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FaceLandmarks {
    points: BTreeMap<LandmarkPoint, Point3>,
}

impl<'de> Deserialize<'de> for FaceLandmarks {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: BTreeMap<String, Point3> = BTreeMap::deserialize(deserializer)?;
        let points = raw
            .into_iter()
            .filter_map(|(name, point)| {
                serde_json::from_value::<LandmarkPoint>(serde_json::Value::String(name))
                    .ok()
                    .map(|p| (p, point))
            })
            .collect();
        Ok(Self { points })
    }
}

impl FaceLandmarks {
    pub fn new<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (LandmarkPoint, Point3)>,
    {
        Self {
            points: points.into_iter().collect(),
        }
    }

    /// 有限な座標を持つ点のみ返す
    pub fn get(&self, point: LandmarkPoint) -> Option<Point3> {
        self.points.get(&point).copied().filter(Point3::is_finite)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 中点 `vertex` における角度（度, 0〜180）
///
/// どちらかの腕の長さが0なら None
pub fn angle_deg(a: &Point3, vertex: &Point3, b: &Point3) -> Option<f64> {
    let (ax, ay, az) = a.sub(vertex);
    let (bx, by, bz) = b.sub(vertex);
    let norm_a = (ax * ax + ay * ay + az * az).sqrt();
    let norm_b = (bx * bx + by * by + bz * bz).sqrt();
    if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
        return None;
    }
    let cos = ((ax * bx + ay * by + az * bz) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}
