//! Scripted engine for unit tests.

use super::{Engine, EngineError, ModelCatalog, Token};
use crate::config::GenerationConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

pub(crate) const GENERATED: &str = " world";

#[derive(Debug)]
pub(crate) struct MockHandle {
    pub config: GenerationConfig,
    live: Arc<AtomicUsize>,
}

#[derive(Default)]
pub(crate) struct MockEngine {
    catalog: ModelCatalog,
    pub pre_builds: AtomicUsize,
    pub builds: AtomicUsize,
    pub disposals: AtomicUsize,
    pub generations: AtomicUsize,
    pub live: Arc<AtomicUsize>,
    pub fail_pre: AtomicBool,
    pub fail_build: AtomicBool,
    pub fail_generate: AtomicBool,
    pub panic_generate: AtomicBool,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    pub configs_seen: Mutex<Vec<GenerationConfig>>,
}

impl MockEngine {
    pub fn with_models(models: &[&str]) -> Self {
        Self {
            catalog: models.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Makes every following generation block until the returned sender
    /// sends (or is dropped).
    pub fn hold(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl Engine for MockEngine {
    type Prepared = GenerationConfig;
    type Handle = MockHandle;

    fn installed_models(&self) -> &ModelCatalog {
        &self.catalog
    }

    fn encode(&self, text: &str) -> Vec<Token> {
        text.chars().map(u32::from).collect()
    }

    fn decode(&self, tokens: &[Token]) -> String {
        tokens.iter().filter_map(|&t| char::from_u32(t)).collect()
    }

    fn build_pre(&self, config: &GenerationConfig) -> Result<GenerationConfig, EngineError> {
        self.pre_builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_pre.load(Ordering::SeqCst) {
            return Err(EngineError::Generation("pre-init failed".to_string()));
        }
        Ok(config.clone())
    }

    fn build_session(
        &self,
        prepared: GenerationConfig,
        config: &GenerationConfig,
    ) -> Result<MockHandle, EngineError> {
        assert_eq!(&prepared, config);
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_build.load(Ordering::SeqCst) {
            return Err(EngineError::EmptyModel(config.model_name.clone()));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(MockHandle {
            config: prepared,
            live: Arc::clone(&self.live),
        })
    }

    fn generate(
        &self,
        handle: &MockHandle,
        _prompt: Option<&[Token]>,
    ) -> Result<Vec<Vec<Token>>, EngineError> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        self.configs_seen.lock().push(handle.config.clone());
        if let Some(gate) = self.gate.lock().as_ref() {
            let _ = gate.recv();
        }
        if self.panic_generate.load(Ordering::SeqCst) {
            panic!("engine exploded");
        }
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(EngineError::Generation("out of memory".to_string()));
        }
        Ok(vec![self.encode(GENERATED), self.encode(" ignored")])
    }

    fn dispose(&self, handle: MockHandle) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        handle.live.fetch_sub(1, Ordering::SeqCst);
    }
}
