//! In-process embedding with an ONNX model such as `jina-embeddings-v2-base-en`.
//!
//! The model directory must contain `model.onnx` and `tokenizer.json`.
//! Token embeddings are mean-pooled over the attention mask and
//! L2-normalized. Inference runs on the blocking thread pool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use ort::session::{Session, SessionInputValue, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};

use super::{Embedder, check_dimensions, normalize};
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    wants_token_type_ids: bool,
    dimension: usize,
}

pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
    model_dir: PathBuf,
    batch_size: usize,
}

impl OnnxEmbedder {
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_dir = config.model_path.clone().ok_or_else(|| {
            EmbeddingError::ModelUnavailable(
                "embedding.model_path is required for the onnx provider".to_string(),
            )
        })?;
        let model = OnnxModel::load(config, &model_dir)?;

        Ok(Self {
            model: Arc::new(model),
            model_dir,
            batch_size: config.batch_size.max(1) as usize,
        })
    }
}

impl OnnxModel {
    fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelUnavailable(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .with_intra_threads(num_cpus())
            .map_err(load_error)?
            .commit_from_file(&model_path)
            .map_err(load_error)?;

        let wants_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens as usize,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            wants_token_type_ids,
            dimension: config.dimension as usize,
        })
    }

    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts, true)
            .map_err(|e| EmbeddingError::TokenizerError(e.to_string()))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = i64::from(id);
                attention_mask[i * max_len + j] = i64::from(m);
            }
        }

        let input_ids_tensor =
            Tensor::from_array(([batch_size, max_len], input_ids)).map_err(inference_error)?;
        let attention_mask_tensor =
            Tensor::from_array(([batch_size, max_len], attention_mask.clone()))
                .map_err(inference_error)?;

        let mut inputs: Vec<(std::borrow::Cow<'_, str>, SessionInputValue<'_>)> = vec![
            ("input_ids".into(), input_ids_tensor.into()),
            ("attention_mask".into(), attention_mask_tensor.into()),
        ];
        if self.wants_token_type_ids {
            let token_type_ids = Tensor::from_array(([batch_size, max_len], vec![0i64; batch_size * max_len]))
                .map_err(inference_error)?;
            inputs.push(("token_type_ids".into(), token_type_ids.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::InferenceError("session lock poisoned".to_string()))?;

        let outputs = session.run(inputs).map_err(inference_error)?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        let embeddings = match **shape {
            [batch, seq_len, hidden] => {
                let (batch, seq_len, hidden) = (batch as usize, seq_len as usize, hidden as usize);
                (0..batch)
                    .map(|i| {
                        let tokens = &data[i * seq_len * hidden..(i + 1) * seq_len * hidden];
                        let mask = &attention_mask[i * max_len..i * max_len + seq_len.min(max_len)];
                        let mut pooled = mean_pool(tokens, mask, hidden);
                        normalize(&mut pooled);
                        pooled
                    })
                    .collect::<Vec<_>>()
            }
            [batch, hidden] => {
                let (batch, hidden) = (batch as usize, hidden as usize);
                data.chunks(hidden)
                    .take(batch)
                    .map(|row| {
                        let mut v = row.to_vec();
                        normalize(&mut v);
                        v
                    })
                    .collect()
            }
            _ => {
                return Err(EmbeddingError::InferenceError(format!(
                    "unexpected output shape: {:?}",
                    &**shape
                )));
            }
        };

        check_dimensions(&embeddings, batch_size, self.dimension)?;
        Ok(embeddings)
    }
}

/// Average the token vectors whose mask is set.
///
/// `tokens` is `mask.len()` (or more) rows of `hidden` floats.
fn mean_pool(tokens: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (row, &m) in tokens.chunks(hidden).zip(mask.iter()) {
        if m == 0 {
            continue;
        }
        count += 1.0;
        for (acc, &x) in sum.iter_mut().zip(row) {
            *acc += x;
        }
    }

    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    sum
}

fn load_error(e: ort::Error) -> EmbeddingError {
    EmbeddingError::ModelUnavailable(e.to_string())
}

fn inference_error(e: ort::Error) -> EmbeddingError {
    EmbeddingError::InferenceError(e.to_string())
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let model = Arc::clone(&self.model);
            let chunk = chunk.to_vec();
            let embeddings = tokio::task::spawn_blocking(move || model.embed(chunk))
                .await
                .map_err(|e| EmbeddingError::InferenceError(e.to_string()))??;
            all_embeddings.extend(embeddings);
        }

        debug!(count = all_embeddings.len(), "embedded batch with onnx model");
        Ok(all_embeddings)
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        self.model
            .session
            .lock()
            .map(|_| ())
            .map_err(|_| EmbeddingError::InferenceError("session lock poisoned".to_string()))
    }

    fn dimension(&self) -> usize {
        self.model.dimension
    }

    fn describe(&self) -> String {
        self.model_dir.display().to_string()
    }
}
