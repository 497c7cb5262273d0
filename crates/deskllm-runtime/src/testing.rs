//! Mock execution backend shared by the orchestrator and runtime tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use deskllm_core::{BatchToken, CoreError, CoreResult, ExecutionBackend, InferenceContext, ModelHandle};
use deskllm_hub::{ModelCatalog, ModelDescriptor, ModelStore};

pub(crate) const MODEL_ID: &str = "mock-model";
pub(crate) const MIN: u64 = 1024;

const VOCAB: [&str; 4] = ["</s>", " <b>Hi</b>", " there", " https://example.com/x"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeed,
    Fail,
    Panic,
}

/// Records every load attempt; GPU (layers > 0) and CPU attempts each follow
/// their own scripted outcome.
pub(crate) struct MockBackend {
    gpu: Outcome,
    cpu: Outcome,
    attempts: Mutex<Vec<u32>>,
    pub(crate) tokenize_calls: Arc<AtomicUsize>,
    load_delay: Duration,
    decode_delay: Duration,
    live_contexts: Arc<AtomicUsize>,
    overlapping_loads: AtomicUsize,
}

impl MockBackend {
    pub(crate) fn new(gpu: Outcome, cpu: Outcome) -> Self {
        Self {
            gpu,
            cpu,
            attempts: Mutex::new(Vec::new()),
            tokenize_calls: Arc::new(AtomicUsize::new(0)),
            load_delay: Duration::ZERO,
            decode_delay: Duration::ZERO,
            live_contexts: Arc::new(AtomicUsize::new(0)),
            overlapping_loads: AtomicUsize::new(0),
        }
    }

    /// Every load attempt sleeps for `delay`.
    pub(crate) fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Every decode step sleeps for `delay`.
    pub(crate) fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    /// Loads that started while another context was still alive.
    pub(crate) fn overlapping_loads(&self) -> usize {
        self.overlapping_loads.load(Ordering::SeqCst)
    }

    pub(crate) fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn tokenize_count(&self) -> usize {
        self.tokenize_calls.load(Ordering::SeqCst)
    }
}

impl ExecutionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn load_model(&self, _path: &Path, acceleration_layers: u32) -> CoreResult<Box<dyn ModelHandle>> {
        self.attempts.lock().unwrap().push(acceleration_layers);
        if self.live_contexts.load(Ordering::SeqCst) > 0 {
            self.overlapping_loads.fetch_add(1, Ordering::SeqCst);
        }
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        let outcome = if acceleration_layers > 0 { self.gpu } else { self.cpu };
        match outcome {
            Outcome::Succeed => Ok(Box::new(MockModel {
                tokenize_calls: Arc::clone(&self.tokenize_calls),
                decode_delay: self.decode_delay,
                live_contexts: Arc::clone(&self.live_contexts),
            })),
            Outcome::Fail => Err(CoreError::DeviceUnavailable("mock accelerator".into())),
            Outcome::Panic => panic!("native library fault"),
        }
    }
}

struct MockModel {
    tokenize_calls: Arc<AtomicUsize>,
    decode_delay: Duration,
    live_contexts: Arc<AtomicUsize>,
}

impl ModelHandle for MockModel {
    fn create_context(self: Box<Self>, context_length: usize) -> CoreResult<Box<dyn InferenceContext>> {
        self.live_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext {
            tokenize_calls: self.tokenize_calls,
            n_ctx: context_length,
            steps: 0,
            decode_delay: self.decode_delay,
            live_contexts: self.live_contexts,
        }))
    }
}

/// Emits token 1, 2, 3 and then EOS, one per decode step.
struct MockContext {
    tokenize_calls: Arc<AtomicUsize>,
    n_ctx: usize,
    steps: usize,
    decode_delay: Duration,
    live_contexts: Arc<AtomicUsize>,
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.live_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InferenceContext for MockContext {
    fn tokenize(&mut self, _text: &str) -> CoreResult<Vec<u32>> {
        self.tokenize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1, 2])
    }

    fn decode(&mut self, batch: &[BatchToken]) -> CoreResult<()> {
        if !self.decode_delay.is_zero() {
            std::thread::sleep(self.decode_delay);
        }
        if batch.first().map(|t| t.pos) == Some(0) {
            self.steps = 0;
        }
        self.steps += 1;
        Ok(())
    }

    fn logits(&mut self) -> CoreResult<Vec<f32>> {
        let next = if self.steps < VOCAB.len() { self.steps } else { 0 };
        let mut logits = vec![0.0; VOCAB.len()];
        logits[next] = 5.0;
        Ok(logits)
    }

    fn token_to_text(&self, id: u32) -> CoreResult<String> {
        Ok(VOCAB[id as usize].to_string())
    }

    fn vocab_size(&self) -> usize {
        VOCAB.len()
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(0)
    }

    fn context_length(&self) -> usize {
        self.n_ctx
    }
}

pub(crate) fn descriptor(size_bytes: u64) -> ModelDescriptor {
    ModelDescriptor {
        id: MODEL_ID.to_string(),
        name: "Mock".to_string(),
        description: String::new(),
        size_bytes,
        primary_url: "http://127.0.0.1:9/mock.gguf".to_string(),
        mirror_urls: vec![],
        param_count: "1M".to_string(),
        quantization: "Q4_K_M".to_string(),
        prompt_template: "User: {prompt}\nAssistant:".to_string(),
        max_context_length: 256,
        default_temperature: 0.0,
        default_top_p: 0.9,
        sha256: None,
        is_acquired: false,
    }
}

/// A store holding one catalog entry, with its artifact written when `acquired`.
pub(crate) fn store(dir: &TempDir, size_bytes: u64, acquired: bool) -> ModelStore {
    let catalog = Arc::new(ModelCatalog::new(vec![descriptor(size_bytes)]).unwrap());
    let store = ModelStore::new(dir.path(), catalog, MIN).unwrap();
    if acquired {
        std::fs::write(store.resolve_path(MODEL_ID).unwrap(), vec![0u8; MIN as usize]).unwrap();
    }
    store
}
