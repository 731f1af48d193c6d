use super::{Engine, EngineError, ModelCatalog, Token};
use crate::config::GenerationConfig;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the hyper-parameter file inside a model directory.
pub const HPARAMS_FILE: &str = "hparams.json";

/// Hyper-parameters read from `<model>/hparams.json`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BigramParams {
    /// Longest sample the model accepts.
    pub n_ctx: u32,
    /// Corpus file, relative to the model directory.
    pub corpus: String,
    /// Fixed RNG seed for reproducible output.
    pub seed: Option<u64>,
}

impl Default for BigramParams {
    fn default() -> Self {
        Self {
            n_ctx: 1024,
            corpus: "corpus.txt".to_string(),
            seed: None,
        }
    }
}

/// Output of the first build phase: the model located and its parameters
/// checked, the corpus not yet loaded.
#[derive(Debug)]
pub struct StagedModel {
    dir: PathBuf,
    params: BigramParams,
}

/// A loaded character-bigram model bound to one configuration.
pub struct BigramHandle {
    model_name: String,
    transitions: HashMap<char, Vec<(char, u32)>>,
    starts: Vec<(char, u32)>,
    length: u32,
    temperature: f32,
    top_k: u32,
    rng: Mutex<StdRng>,
}

impl BigramHandle {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Number of distinct characters the model can emit.
    pub fn vocabulary(&self) -> usize {
        self.starts.len()
    }
}

/// Character-bigram sampler over a directory of corpora.
///
/// Each sub-directory of the model root is one model: an optional
/// [`HPARAMS_FILE`] plus a plain-text corpus. Tokens are Unicode scalar
/// values, so every valid string round-trips through
/// [`Engine::encode`]/[`Engine::decode`].
#[derive(Debug, Clone)]
pub struct BigramEngine {
    root: PathBuf,
    catalog: ModelCatalog,
}

impl BigramEngine {
    /// Opens the model root and lists the installed models.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        let catalog = ModelCatalog::scan(&root)?;
        Ok(Self { root, catalog })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_params(dir: &Path) -> Result<BigramParams, EngineError> {
        let path = dir.join(HPARAMS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| EngineError::Hparams {
                path: path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BigramParams::default()),
            Err(source) => Err(EngineError::Io { path, source }),
        }
    }
}

impl Engine for BigramEngine {
    type Prepared = StagedModel;
    type Handle = BigramHandle;

    fn installed_models(&self) -> &ModelCatalog {
        &self.catalog
    }

    fn encode(&self, text: &str) -> Vec<Token> {
        text.chars().map(u32::from).collect()
    }

    fn decode(&self, tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|&t| char::from_u32(t).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    fn build_pre(&self, config: &GenerationConfig) -> Result<StagedModel, EngineError> {
        let dir = self.root.join(&config.model_name);
        let params = Self::read_params(&dir)?;
        if config.length > params.n_ctx {
            return Err(EngineError::WindowExceeded {
                length: config.length,
                window: params.n_ctx,
            });
        }
        Ok(StagedModel { dir, params })
    }

    fn build_session(
        &self,
        prepared: StagedModel,
        config: &GenerationConfig,
    ) -> Result<BigramHandle, EngineError> {
        let path = prepared.dir.join(&prepared.params.corpus);
        let corpus =
            std::fs::read_to_string(&path).map_err(|source| EngineError::Io { path, source })?;

        let mut pairs: HashMap<char, HashMap<char, u32>> = HashMap::new();
        let mut unigrams: HashMap<char, u32> = HashMap::new();
        let mut prev = None;
        for c in corpus.chars() {
            *unigrams.entry(c).or_default() += 1;
            if let Some(p) = prev {
                *pairs.entry(p).or_default().entry(c).or_default() += 1;
            }
            prev = Some(c);
        }
        if unigrams.is_empty() {
            return Err(EngineError::EmptyModel(config.model_name.clone()));
        }

        let transitions = pairs
            .into_iter()
            .map(|(c, next)| (c, ranked(next)))
            .collect();
        let rng = match prepared.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(BigramHandle {
            model_name: config.model_name.clone(),
            transitions,
            starts: ranked(unigrams),
            length: config.length,
            temperature: config.temperature,
            top_k: config.top_k,
            rng: Mutex::new(rng),
        })
    }

    fn generate(
        &self,
        handle: &BigramHandle,
        prompt: Option<&[Token]>,
    ) -> Result<Vec<Vec<Token>>, EngineError> {
        let mut rng = handle.rng.lock();
        let mut prev = prompt
            .and_then(|p| p.last())
            .and_then(|&t| char::from_u32(t));
        let mut out = Vec::with_capacity(handle.length as usize);

        for _ in 0..handle.length {
            let candidates = prev
                .and_then(|c| handle.transitions.get(&c))
                .filter(|next| !next.is_empty())
                .unwrap_or(&handle.starts);
            let next = sample(candidates, handle.top_k, handle.temperature, &mut *rng)
                .ok_or_else(|| EngineError::Generation("no candidate tokens".to_string()))?;
            out.push(u32::from(next));
            prev = Some(next);
        }

        Ok(vec![out])
    }

    fn dispose(&self, handle: BigramHandle) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            model = handle.model_name(),
            vocabulary = handle.vocabulary(),
            "Disposing bigram model"
        );
        drop(handle);
    }
}

/// Orders counts by frequency (descending), breaking ties by character.
fn ranked(counts: HashMap<char, u32>) -> Vec<(char, u32)> {
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Draws one character from `candidates` (sorted by count, descending).
///
/// Weights are `count^(1/temperature)`, restricted to the first `top_k`
/// candidates when `top_k > 0`. Falls back to the most frequent candidate
/// when the weights overflow.
fn sample<R: Rng + ?Sized>(
    candidates: &[(char, u32)],
    top_k: u32,
    temperature: f32,
    rng: &mut R,
) -> Option<char> {
    let pool = match top_k as usize {
        0 => candidates,
        k => &candidates[..k.min(candidates.len())],
    };
    let first = pool.first()?.0;

    let exponent = 1.0 / f64::from(temperature);
    let weights: Vec<f64> = pool
        .iter()
        .map(|&(_, count)| f64::from(count).powf(exponent))
        .collect();
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Some(first);
    }

    let mut target = rng.random::<f64>() * total;
    for (&(c, _), weight) in pool.iter().zip(&weights) {
        if target < *weight {
            return Some(c);
        }
        target -= weight;
    }
    pool.last().map(|&(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    /// One sub-directory per `(name, hparams, corpus)`.
    fn model_dir(models: &[(&str, Option<&str>, &str)]) -> TempDir {
        let root = tempfile::tempdir().unwrap();
        for (name, hparams, corpus) in models {
            let dir = root.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            if let Some(hparams) = hparams {
                std::fs::write(dir.join(HPARAMS_FILE), hparams).unwrap();
            }
            std::fs::write(dir.join("corpus.txt"), corpus).unwrap();
        }
        root
    }

    fn config(model: &str, length: u32, top_k: u32) -> GenerationConfig {
        GenerationConfig {
            nsamples: 1,
            length,
            temperature: 1.0,
            top_k,
            model_name: model.to_string(),
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let models = model_dir(&[("117M", None, "abc")]);
        let engine = BigramEngine::open(models.path()).unwrap();
        for text in ["", "hello", "héllo wörld", "emoji 🦀 and tabs\t\n", "日本語"] {
            assert_eq!(engine.decode(&engine.encode(text)), text);
        }
    }

    #[test]
    fn generates_requested_length_from_corpus_alphabet() {
        let models = model_dir(&[("117M", Some(r#"{"seed": 7}"#), "the quick brown fox")]);
        let engine = BigramEngine::open(models.path()).unwrap();
        let config = config("117M", 50, 0);
        let staged = engine.build_pre(&config).unwrap();
        let handle = engine.build_session(staged, &config).unwrap();

        let prompt = engine.encode("the");
        let batch = engine.generate(&handle, Some(&prompt)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].len(), 50);
        let text = engine.decode(&batch[0]);
        assert!(text.chars().all(|c| "the quickbrownfx".contains(c)));
    }

    #[test]
    fn top_k_one_is_deterministic() {
        let models = model_dir(&[("117M", None, "abababababac")]);
        let engine = BigramEngine::open(models.path()).unwrap();
        let config = config("117M", 6, 1);
        let staged = engine.build_pre(&config).unwrap();
        let handle = engine.build_session(staged, &config).unwrap();

        let prompt = engine.encode("a");
        let batch = engine.generate(&handle, Some(&prompt)).unwrap();
        assert_eq!(engine.decode(&batch[0]), "bababa");
    }

    #[test]
    fn seeded_models_are_reproducible() {
        let models = model_dir(&[(
            "117M",
            Some(r#"{"seed": 42}"#),
            "lorem ipsum dolor sit amet",
        )]);
        let engine = BigramEngine::open(models.path()).unwrap();
        let config = config("117M", 40, 0);
        let run = || {
            let staged = engine.build_pre(&config).unwrap();
            let handle = engine.build_session(staged, &config).unwrap();
            engine.generate(&handle, None).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn length_beyond_window_fails_in_first_phase() {
        let models = model_dir(&[("117M", Some(r#"{"n_ctx": 16}"#), "abc")]);
        let engine = BigramEngine::open(models.path()).unwrap();
        assert!(matches!(
            engine.build_pre(&config("117M", 17, 0)),
            Err(EngineError::WindowExceeded {
                length: 17,
                window: 16
            })
        ));
    }

    #[test]
    fn malformed_hparams_fail() {
        let models = model_dir(&[("117M", Some("{ nope"), "abc")]);
        let engine = BigramEngine::open(models.path()).unwrap();
        assert!(matches!(
            engine.build_pre(&config("117M", 1, 0)),
            Err(EngineError::Hparams { .. })
        ));
    }

    #[test]
    fn empty_corpus_fails_in_second_phase() {
        let models = model_dir(&[("117M", None, "")]);
        let engine = BigramEngine::open(models.path()).unwrap();
        let config = config("117M", 5, 0);
        let staged = engine.build_pre(&config).unwrap();
        assert!(matches!(
            engine.build_session(staged, &config),
            Err(EngineError::EmptyModel(_))
        ));
    }

    #[test]
    fn sampling_respects_top_k() {
        let candidates = [('a', 10), ('b', 5), ('c', 1)];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let c = sample(&candidates, 2, 1.0, &mut rng).unwrap();
            assert_ne!(c, 'c');
        }
        assert_eq!(sample(&[], 0, 1.0, &mut rng), None);
    }
}
