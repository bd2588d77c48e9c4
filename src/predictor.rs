//! Pretrained fight outcome classifier.
//!
//! The network is `Linear(14, 128) -> ReLU -> Linear(128, 64) -> ReLU ->
//! Linear(64, 1)` and produces one logit for "red corner wins". Weights come
//! straight from the training checkpoint (`torch.save` with the parameters
//! under `model_state_dict`). PyTorch names the layers by their
//! `nn.Sequential` index, so `net.0`, `net.2` and `net.4` are remapped onto
//! the module fields below.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use burn::backend::NdArray;
use burn::backend::ndarray::NdArrayDevice;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use burn_store::{ModuleSnapshot, PytorchStore};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::ModelArtifacts;
use crate::features::{FEATURE_NAMES, FEATURE_VECTOR_LEN, FeatureVector};

pub const HIDDEN_1: usize = 128;
pub const HIDDEN_2: usize = 64;
pub const OUTPUT_DIM: usize = 1;

const STATE_DICT_KEY: &str = "model_state_dict";

type Cpu = NdArray<f32>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse model metadata {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model expects {found} inputs, feature vectors have {expected}")]
    InputDim { expected: usize, found: usize },
    #[error("load checkpoint {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },
    #[error("parameter {0} contains a non-finite value")]
    NonFiniteParameter(String),
    #[error("metadata feature order {found:?} does not match {expected:?}")]
    FeatureOrder {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("invalid input normalization: {0}")]
    BadNormalization(String),
    #[error("feature vector has {found} values, model expects {expected}")]
    InvalidVectorShape { expected: usize, found: usize },
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Contents of `predictor_meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub input_dim: usize,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub feature_means: Option<Vec<f64>>,
    #[serde(default)]
    pub feature_stds: Option<Vec<f64>>,
}

/// Input layout the model expects: every canonical feature with a `red_`
/// prefix, then again with `blue_`.
pub fn input_feature_names() -> Vec<String> {
    let red = FEATURE_NAMES.iter().map(|n| format!("red_{n}"));
    let blue = FEATURE_NAMES.iter().map(|n| format!("blue_{n}"));
    red.chain(blue).collect()
}

/// The trained network. Inference only, so there is no dropout.
#[derive(Module, Debug)]
pub struct FightNet<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
}

impl<B: Backend> FightNet<B> {
    pub fn new(device: &B::Device, input_dim: usize) -> Self {
        Self {
            fc1: LinearConfig::new(input_dim, HIDDEN_1).init(device),
            fc2: LinearConfig::new(HIDDEN_1, HIDDEN_2).init(device),
            out: LinearConfig::new(HIDDEN_2, OUTPUT_DIM).init(device),
        }
    }

    /// `[batch, input_dim] -> [batch, 1]` logits.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        self.out.forward(x)
    }

    /// Checkpoint key of the first parameter holding a NaN or infinity.
    fn non_finite_param(&self) -> Option<String> {
        let layers = [("net.0", &self.fc1), ("net.2", &self.fc2), ("net.4", &self.out)];
        for (key, layer) in layers {
            if !all_finite(layer.weight.val().into_data()) {
                return Some(format!("{key}.weight"));
            }
            if let Some(bias) = &layer.bias
                && !all_finite(bias.val().into_data())
            {
                return Some(format!("{key}.bias"));
            }
        }
        None
    }
}

fn all_finite(data: TensorData) -> bool {
    data.iter::<f32>().all(f32::is_finite)
}

/// Opens a `torch.save` checkpoint and maps its `nn.Sequential` keys onto
/// [`FightNet`]. Linear weights are transposed from PyTorch's `[out, in]`.
fn checkpoint_store(path: &Path) -> PytorchStore {
    PytorchStore::from_file(path)
        .with_top_level_key(STATE_DICT_KEY)
        .map_indices_contiguous(false)
        .with_key_remapping(r"^net\.0\.", "fc1.")
        .with_key_remapping(r"^net\.2\.", "fc2.")
        .with_key_remapping(r"^net\.4\.", "out.")
}

#[derive(Debug, Clone)]
struct InputNorm {
    means: Vec<f32>,
    stds: Vec<f32>,
}

impl InputNorm {
    fn from_metadata(meta: &ModelMetadata) -> Result<Option<Self>, ModelError> {
        let (means, stds) = match (&meta.feature_means, &meta.feature_stds) {
            (None, None) => return Ok(None),
            (Some(m), Some(s)) => (m, s),
            _ => {
                return Err(ModelError::BadNormalization(
                    "feature_means and feature_stds must be given together".to_string(),
                ));
            }
        };
        if means.len() != meta.input_dim || stds.len() != meta.input_dim {
            return Err(ModelError::BadNormalization(format!(
                "expected {} means and stds, got {} and {}",
                meta.input_dim,
                means.len(),
                stds.len()
            )));
        }
        if means.iter().any(|m| !m.is_finite()) {
            return Err(ModelError::BadNormalization("non-finite mean".to_string()));
        }
        if stds.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ModelError::BadNormalization(
                "stds must be finite and positive".to_string(),
            ));
        }
        Ok(Some(Self {
            means: means.iter().map(|m| *m as f32).collect(),
            stds: stds.iter().map(|s| *s as f32).collect(),
        }))
    }

    fn apply(&self, x: &mut [f32]) {
        for ((v, mean), std) in x.iter_mut().zip(&self.means).zip(&self.stds) {
            *v = (*v - mean) / std;
        }
    }
}

/// Red/blue win probabilities. `blue` is always `1 - red`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinProbabilities {
    pub red: f64,
    pub blue: f64,
}

impl WinProbabilities {
    pub fn from_logit(logit: f32) -> Self {
        let red = sigmoid(logit as f64);
        Self {
            red,
            blue: 1.0 - red,
        }
    }
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// A loaded, immutable classifier shared by every request.
#[derive(Debug)]
pub struct FightPredictor {
    // burn modules are `Send` but not `Sync`.
    net: Mutex<FightNet<Cpu>>,
    input_norm: Option<InputNorm>,
    device: NdArrayDevice,
}

impl FightPredictor {
    pub fn load(artifacts: &ModelArtifacts) -> Result<Self, ModelError> {
        let meta = read_metadata(&artifacts.meta_path)?;
        check_metadata(&meta)?;

        let weights = &artifacts.weights_path;
        fs::metadata(weights).map_err(|source| ModelError::Io {
            path: weights.clone(),
            source,
        })?;
        let device = NdArrayDevice::default();
        let mut net = FightNet::<Cpu>::new(&device, meta.input_dim);
        net.load_from(&mut checkpoint_store(weights))
            .map_err(|err| ModelError::Checkpoint {
                path: weights.clone(),
                message: err.to_string(),
            })?;

        let predictor = Self::from_network(&meta, net)?;
        info!(
            meta = %artifacts.meta_path.display(),
            weights = %weights.display(),
            input_dim = meta.input_dim,
            "fight predictor loaded"
        );
        Ok(predictor)
    }

    fn from_network(meta: &ModelMetadata, net: FightNet<Cpu>) -> Result<Self, ModelError> {
        let input_norm = check_metadata(meta)?;
        if let Some(key) = net.non_finite_param() {
            return Err(ModelError::NonFiniteParameter(key));
        }
        Ok(Self {
            net: Mutex::new(net),
            input_norm,
            device: NdArrayDevice::default(),
        })
    }

    /// Raw output of the last layer.
    pub fn logit(&self, input: &[f64]) -> Result<f32, ModelError> {
        if input.len() != FEATURE_VECTOR_LEN {
            return Err(ModelError::InvalidVectorShape {
                expected: FEATURE_VECTOR_LEN,
                found: input.len(),
            });
        }
        let mut x = input.iter().map(|v| *v as f32).collect::<Vec<f32>>();
        if let Some(norm) = &self.input_norm {
            norm.apply(&mut x);
        }
        let x = Tensor::<Cpu, 1>::from_floats(x.as_slice(), &self.device)
            .reshape([1, FEATURE_VECTOR_LEN]);

        let net = self.net.lock().unwrap_or_else(PoisonError::into_inner);
        let data = net.forward(x).into_data();
        let values = data
            .as_slice::<f32>()
            .map_err(|err| ModelError::Inference(format!("{err:?}")))?;
        values
            .first()
            .copied()
            .ok_or_else(|| ModelError::Inference("empty model output".to_string()))
    }

    pub fn predict(&self, vector: &FeatureVector) -> Result<WinProbabilities, ModelError> {
        self.logit(vector.as_slice()).map(WinProbabilities::from_logit)
    }
}

/// Everything the metadata alone can rule out, checked before the
/// checkpoint is opened.
fn check_metadata(meta: &ModelMetadata) -> Result<Option<InputNorm>, ModelError> {
    if meta.input_dim != FEATURE_VECTOR_LEN {
        return Err(ModelError::InputDim {
            expected: FEATURE_VECTOR_LEN,
            found: meta.input_dim,
        });
    }
    if !meta.feature_names.is_empty() {
        let expected = input_feature_names();
        if meta.feature_names != expected {
            return Err(ModelError::FeatureOrder {
                expected,
                found: meta.feature_names.clone(),
            });
        }
    }
    InputNorm::from_metadata(meta)
}

fn read_metadata(path: &Path) -> Result<ModelMetadata, ModelError> {
    let raw = fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ModelError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

type Loader = Box<dyn Fn() -> Result<FightPredictor, ModelError> + Send + Sync>;

/// Loads the classifier on first use and hands out the same instance
/// afterwards. Concurrent first callers block on one load. A failed load
/// leaves the cell empty, so every later call reports the failure again.
pub struct LazyPredictor {
    loader: Loader,
    cell: OnceCell<FightPredictor>,
}

impl LazyPredictor {
    pub fn from_artifacts(artifacts: ModelArtifacts) -> Self {
        Self::with_loader(move || FightPredictor::load(&artifacts))
    }

    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> Result<FightPredictor, ModelError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Result<&FightPredictor, ModelError> {
        self.cell.get_or_try_init(|| (self.loader)())
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for LazyPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyPredictor")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
