//! Direction classifier seam.
//!
//! The model is trained offline (see `dataset`) and shipped as a JSON tree
//! ensemble. Having no model is a normal state: the predictor then answers
//! `None` and callers show "no prediction".

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::services::strategies::{
    common::Candle,
    indicators::{IndicatorPoint, IndicatorSeries},
};
use crate::utils::errors::ModelError;

/// Column order the model was trained on.
pub const FEATURE_NAMES: [&str; 7] = ["rsi", "macd", "bb_upper", "bb_lower", "sma50", "sma200", "close"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Direction {
    DownOrFlat,
    Up,
}

impl From<Direction> for u8 {
    fn from(d: Direction) -> u8 {
        match d {
            Direction::DownOrFlat => 0,
            Direction::Up => 1,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Direction::DownOrFlat),
            1 => Ok(Direction::Up),
            other => Err(format!("direction must be 0 or 1, got {other}")),
        }
    }
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Up => "📈 Steigt",
            Direction::DownOrFlat => "📉 Fällt/Seitwärts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Features {
    pub rsi:      f64,
    pub macd:     f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub sma_fast: f64,
    pub sma_slow: f64,
    pub close:    f64,
}

impl Features {
    /// `None` while any indicator is still warming up.
    pub fn from_point(p: &IndicatorPoint) -> Option<Self> {
        Some(Self {
            rsi: p.rsi?,
            macd: p.macd?,
            bb_upper: p.bb_upper?,
            bb_lower: p.bb_lower?,
            sma_fast: p.sma_fast?,
            sma_slow: p.sma_slow?,
            close: p.close,
        })
    }

    pub fn as_array(&self) -> [f64; 7] {
        [self.rsi, self.macd, self.bb_upper, self.bb_lower, self.sma_fast, self.sma_slow, self.close]
    }
}

pub trait Classifier: Send + Sync {
    /// `[p_down_or_flat, p_up]`
    fn predict_proba(&self, features: &Features) -> Result<[f64; 2], ModelError>;
    fn version(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Proba {
    pub fall: f64,
    pub rise: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub direction:     Direction,
    pub confidence:    f64,
    pub proba:         Proba,
    pub model_version: String,
}

// ============================================================
// Tree ensemble
// ============================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    /// `x[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: [f64; 2],
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForestModel {
    #[serde(default = "default_version")]
    version: String,
    trees: Vec<Tree>,
}
fn default_version() -> String {
    "v1.0".into()
}

impl ForestModel {
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let model: ForestModel = serde_json::from_str(raw)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::Missing(path.display().to_string()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Malformed("no trees".into()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::Malformed(format!("tree {t} has no nodes")));
            }
            for node in &tree.nodes {
                if let Node::Split { feature, left, right, .. } = *node {
                    if feature >= FEATURE_NAMES.len() {
                        return Err(ModelError::Malformed(format!("tree {t}: feature {feature}")));
                    }
                    if left >= tree.nodes.len() || right >= tree.nodes.len() {
                        return Err(ModelError::Malformed(format!("tree {t}: child out of range")));
                    }
                }
            }
        }
        Ok(())
    }

    fn walk(tree: &Tree, x: &[f64; 7]) -> Result<[f64; 2], ModelError> {
        let mut idx = 0;
        // a path longer than the node count means a cycle
        for _ in 0..=tree.nodes.len() {
            match tree.nodes[idx] {
                Node::Leaf { value } => return Ok(value),
                Node::Split { feature, threshold, left, right } => {
                    idx = if x[feature] <= threshold { left } else { right };
                }
            }
        }
        Err(ModelError::Malformed("cycle in tree".into()))
    }
}

impl Classifier for ForestModel {
    fn predict_proba(&self, features: &Features) -> Result<[f64; 2], ModelError> {
        let x = features.as_array();
        let mut acc = [0.0, 0.0];
        for tree in &self.trees {
            let v = Self::walk(tree, &x)?;
            acc[0] += v[0];
            acc[1] += v[1];
        }
        let n = self.trees.len() as f64;
        Ok([acc[0] / n, acc[1] / n])
    }

    fn version(&self) -> &str {
        &self.version
    }
}

// ============================================================
// Predictor
// ============================================================

pub struct Predictor {
    model: Option<Box<dyn Classifier>>,
}

impl Predictor {
    pub fn new(model: Option<Box<dyn Classifier>>) -> Self {
        Self { model }
    }

    pub fn unavailable() -> Self {
        Self { model: None }
    }

    /// Load the ensemble at `path`; any failure leaves the predictor empty.
    pub fn load(path: &Path) -> Self {
        match ForestModel::load(path) {
            Ok(m) => {
                log::info!("model {} loaded from {}", m.version(), path.display());
                Self::new(Some(Box::new(m)))
            }
            Err(e) => {
                log::warn!("no prediction model available: {e}");
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn predict_latest(&self, candles: &[Candle], series: &IndicatorSeries) -> Option<PredictionResult> {
        let n = candles.len().min(series.len());
        self.predict_at(candles, series, n.checked_sub(1)?)
    }

    pub fn predict_at(
        &self,
        candles: &[Candle],
        series: &IndicatorSeries,
        i: usize,
    ) -> Option<PredictionResult> {
        let model = self.model.as_ref()?;
        let features = Features::from_point(&series.point(candles, i)?)?;
        let p = match model.predict_proba(&features) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("prediction failed: {e}");
                return None;
            }
        };
        let direction = if p[1] > p[0] { Direction::Up } else { Direction::DownOrFlat };
        Some(PredictionResult {
            direction,
            confidence: p[0].max(p[1]),
            proba: Proba { fall: p[0], rise: p[1] },
            model_version: model.version().to_string(),
        })
    }
}
