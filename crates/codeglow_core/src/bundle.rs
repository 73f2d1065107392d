//! Engine acquisition strategies.
//!
//! The bundled strategies share one read-only engine per bundle through the
//! registry; custom payloads go into content-keyed overlay engines. The
//! supplied strategy loads payloads into the caller's engine. Fine-grained
//! engines are constructed per configuration and deduplicated by
//! [`EngineConfig::cache_key`].

use crate::constants::{PLAINTEXT, TRACE_TARGET};
use crate::engine::HighlightEngine;
use crate::error::HighlightError;
use crate::language::{is_plaintext, LoadPayload};
use crate::registry::EngineRegistry;
use crate::theme::ThemeSource;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tokenizer backend an engine is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RegexBackend {
    #[default]
    Oniguruma,
    /// Pure-Rust regex engine.
    Fancy,
}

impl RegexBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Oniguruma => "oniguruma",
            Self::Fancy => "fancy-regex",
        }
    }
}

/// What a provisioner is asked to build.
///
/// `None` for languages or themes means "everything the bundle carries".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub languages: Option<Vec<String>>,
    pub themes: Option<Vec<String>>,
    pub backend: RegexBackend,
    pub precompiled: bool,
}

/// Builds engine instances for one grammar/theme bundle.
///
/// Construction is synchronous and can be slow; callers run it on a blocking
/// worker thread.
pub trait EngineProvisioner: Send + Sync {
    /// Bundle name used in registry keys (`full`, `web`, ...).
    fn bundle(&self) -> &str;

    /// # Errors
    /// Returns [`HighlightError::LanguageNotFound`] or
    /// [`HighlightError::ThemeNotFound`] when the request names ids the bundle
    /// does not carry.
    fn provision(&self, request: &ProvisionRequest)
        -> Result<Arc<dyn HighlightEngine>, HighlightError>;
}

/// Explicit engine configuration for fine-grained construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub languages: Vec<String>,
    pub themes: Vec<String>,
    pub backend: RegexBackend,
    pub precompiled: bool,
}

impl EngineConfig {
    pub fn new<L, T>(languages: L, themes: T) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
            themes: themes.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: RegexBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_precompiled(mut self, precompiled: bool) -> Self {
        self.precompiled = precompiled;
        self
    }

    /// Deterministic registry key for this configuration.
    ///
    /// Languages are sorted and deduplicated, themes sorted, so configurations
    /// that differ only in ordering share a key.
    ///
    /// # Returns
    /// `langs|themes|backend|precompiled`, prefixed with the bundle name.
    pub fn cache_key(&self, bundle: &str) -> String {
        let mut languages: Vec<&str> = self.languages.iter().map(|id| id.trim()).collect();
        languages.sort_unstable();
        languages.dedup();
        let mut themes: Vec<&str> = self.themes.iter().map(|id| id.trim()).collect();
        themes.sort_unstable();
        format!(
            "{bundle}:{}|{}|{}|{}",
            languages.join(","),
            themes.join(","),
            self.backend.name(),
            self.precompiled
        )
    }

    fn to_request(&self) -> ProvisionRequest {
        ProvisionRequest {
            languages: Some(self.languages.clone()),
            themes: Some(self.themes.clone()),
            backend: self.backend,
            precompiled: self.precompiled,
        }
    }
}

/// Construct (or reuse) an engine scoped to `config`.
///
/// Identical configurations, in any array order, resolve to one construction;
/// concurrent callers join the construction already in flight.
///
/// # Errors
/// Propagates the provisioner's error. Failed constructions are not cached.
pub async fn create_engine(
    provisioner: Arc<dyn EngineProvisioner>,
    registry: &EngineRegistry,
    config: EngineConfig,
) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
    let key = config.cache_key(provisioner.bundle());
    let request = config.to_request();
    registry
        .get_or_try_init(&key, || provision_blocking(provisioner, request))
        .await
}

async fn provision_blocking(
    provisioner: Arc<dyn EngineProvisioner>,
    request: ProvisionRequest,
) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
    debug!(
        target: TRACE_TARGET,
        event = "provision",
        bundle = provisioner.bundle(),
        languages = ?request.languages,
        "constructing engine"
    );
    tokio::task::spawn_blocking(move || provisioner.provision(&request)).await?
}

/// Where the pipeline gets its engine from.
#[derive(Clone)]
pub enum EngineSource {
    /// Shared singleton of a grammar/theme bundle.
    Bundled {
        provisioner: Arc<dyn EngineProvisioner>,
        registry: Arc<EngineRegistry>,
    },
    /// Engine passed in through the request options.
    Supplied,
}

impl fmt::Debug for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled { provisioner, .. } => f
                .debug_struct("Bundled")
                .field("bundle", &provisioner.bundle())
                .finish(),
            Self::Supplied => f.write_str("Supplied"),
        }
    }
}

impl EngineSource {
    /// Bundled strategy backed by the process-wide registry.
    pub fn bundled(provisioner: Arc<dyn EngineProvisioner>) -> Self {
        Self::Bundled {
            provisioner,
            registry: EngineRegistry::global(),
        }
    }

    pub fn bundled_with_registry(
        provisioner: Arc<dyn EngineProvisioner>,
        registry: Arc<EngineRegistry>,
    ) -> Self {
        Self::Bundled {
            provisioner,
            registry,
        }
    }

    /// Synchronous configuration check run before any work is scheduled.
    ///
    /// # Errors
    /// Returns [`HighlightError::MissingEngine`] for the supplied strategy
    /// without an engine.
    pub fn check(&self, supplied: Option<&Arc<dyn HighlightEngine>>) -> Result<(), HighlightError> {
        match (self, supplied) {
            (Self::Supplied, None) => Err(HighlightError::MissingEngine),
            _ => Ok(()),
        }
    }

    /// Obtain an engine able to tokenize `language` with `themes`.
    ///
    /// The bundled singleton is only read. Requests carrying a custom grammar
    /// or custom themes get an overlay engine registered under a key derived
    /// from the bundle and the content of those payloads, so identical
    /// payloads share one overlay and different payloads never see each
    /// other. A supplied engine has payloads loaded into it directly. When the
    /// language cannot be loaded the request is retried once with plaintext
    /// only; a failure of that retry propagates.
    ///
    /// # Arguments
    /// - `supplied`: Caller engine; required for [`EngineSource::Supplied`],
    ///   preferred over the bundle otherwise.
    /// - `language`: Load payload from language resolution.
    /// - `themes`: Themes that must be available.
    ///
    /// # Errors
    /// [`HighlightError::MissingEngine`], provisioning errors, or
    /// [`HighlightError::ThemeNotFound`] / [`HighlightError::InvalidTheme`].
    pub async fn acquire(
        &self,
        supplied: Option<Arc<dyn HighlightEngine>>,
        language: &LoadPayload,
        themes: &[ThemeSource],
    ) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
        match self.try_acquire(supplied.clone(), language, themes).await {
            Ok(engine) => Ok(engine),
            Err(err) if err.is_language_failure() => {
                warn!(
                    target: TRACE_TARGET,
                    event = "language_fallback",
                    error = %err,
                    "language unavailable; retrying with {PLAINTEXT}"
                );
                self.try_acquire(supplied, &LoadPayload::None, themes).await
            }
            Err(err) => Err(err),
        }
    }

    async fn try_acquire(
        &self,
        supplied: Option<Arc<dyn HighlightEngine>>,
        language: &LoadPayload,
        themes: &[ThemeSource],
    ) -> Result<Arc<dyn HighlightEngine>, HighlightError> {
        let (provisioner, registry) = match (self, supplied) {
            (_, Some(engine)) => {
                load_requested(engine.clone(), language.clone(), themes.to_vec()).await?;
                return Ok(engine);
            }
            (Self::Supplied, None) => return Err(HighlightError::MissingEngine),
            (
                Self::Bundled {
                    provisioner,
                    registry,
                },
                None,
            ) => (provisioner.clone(), registry),
        };

        let shared_key = format!("bundle:{}", provisioner.bundle());
        let Some(fingerprint) = overlay_fingerprint(language, themes)? else {
            let engine = registry
                .get_or_try_init(&shared_key, || {
                    provision_blocking(provisioner, ProvisionRequest::default())
                })
                .await?;
            load_requested(engine.clone(), language.clone(), themes.to_vec()).await?;
            return Ok(engine);
        };

        let key = format!("{shared_key}+{fingerprint}");
        let (language, themes) = (language.clone(), themes.to_vec());
        registry
            .get_or_try_init(&key, || async move {
                let engine = provision_blocking(provisioner, ProvisionRequest::default()).await?;
                load_requested(engine.clone(), language, themes).await?;
                debug!(
                    target: TRACE_TARGET,
                    event = "overlay_built",
                    fingerprint = %fingerprint,
                    "engine with custom payloads ready"
                );
                Ok(engine)
            })
            .await
    }
}

/// Content hash of the custom payloads of a request, or `None` when the
/// request only names bundled grammars and themes.
///
/// # Errors
/// [`HighlightError::InvalidGrammar`] or [`HighlightError::InvalidTheme`] when
/// a payload cannot be serialized.
fn overlay_fingerprint(
    language: &LoadPayload,
    themes: &[ThemeSource],
) -> Result<Option<String>, HighlightError> {
    let mut hasher = blake3::Hasher::new();
    let mut custom = false;
    if let LoadPayload::Custom(grammar) = language {
        let bytes = serde_json::to_vec(grammar.as_ref()).map_err(|err| {
            HighlightError::InvalidGrammar {
                name: grammar.name.clone(),
                message: err.to_string(),
            }
        })?;
        hasher.update(b"grammar:");
        hasher.update(&bytes);
        custom = true;
    }
    for theme in themes {
        if let ThemeSource::Custom(definition) = theme {
            let bytes = serde_json::to_vec(definition.as_ref()).map_err(|err| {
                HighlightError::InvalidTheme {
                    name: definition.id().to_string(),
                    message: err.to_string(),
                }
            })?;
            hasher.update(b"theme:");
            hasher.update(&bytes);
            custom = true;
        }
    }
    Ok(custom.then(|| hasher.finalize().to_hex().as_str()[..16].to_string()))
}

/// Load custom payloads into `engine` and check that bundled ids are present.
async fn load_requested(
    engine: Arc<dyn HighlightEngine>,
    language: LoadPayload,
    themes: Vec<ThemeSource>,
) -> Result<(), HighlightError> {
    tokio::task::spawn_blocking(move || {
        match &language {
            LoadPayload::Custom(grammar) => engine.load_language(grammar)?,
            LoadPayload::Bundled(id) if !is_plaintext(id) && !engine.supports_language(id) => {
                return Err(HighlightError::LanguageNotFound(id.clone()));
            }
            LoadPayload::Bundled(_) | LoadPayload::None => {}
        }
        for theme in &themes {
            match theme {
                ThemeSource::Custom(definition) => engine.load_theme(definition)?,
                ThemeSource::Named(id) if !engine.has_theme(id) => {
                    return Err(HighlightError::ThemeNotFound(id.clone()));
                }
                ThemeSource::Named(_) => {}
            }
        }
        Ok(())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::CustomGrammar;
    use crate::test_support::{CountingProvisioner, StubEngine};
    use crate::theme::ThemeDefinition;

    fn stub_provisioner() -> Arc<CountingProvisioner> {
        Arc::new(CountingProvisioner::new(
            &["javascript", "rust", "python"],
            &["base16-ocean.dark", "InspiredGitHub"],
        ))
    }

    #[test]
    fn cache_key_ignores_order_and_duplicates() {
        let a = EngineConfig::new(["rust", "javascript", "rust"], ["b", "a"]);
        let b = EngineConfig::new(["javascript", "rust"], ["a", "b"]);
        assert_eq!(a.cache_key("full"), b.cache_key("full"));
        assert_eq!(a.cache_key("full"), "full:javascript,rust|a,b|oniguruma|false");
        let fancy = b.clone().with_backend(RegexBackend::Fancy);
        assert_ne!(fancy.cache_key("full"), b.cache_key("full"));
        let precompiled = b.clone().with_precompiled(true);
        assert_ne!(precompiled.cache_key("full"), b.cache_key("full"));
    }

    #[tokio::test]
    async fn reordered_configs_construct_once_and_different_sets_construct_again() {
        let provisioner = stub_provisioner();
        let registry = EngineRegistry::new();
        let first = create_engine(
            provisioner.clone(),
            &registry,
            EngineConfig::new(["rust", "javascript"], ["InspiredGitHub", "base16-ocean.dark"]),
        )
        .await
        .expect("first");
        let second = create_engine(
            provisioner.clone(),
            &registry,
            EngineConfig::new(["javascript", "rust"], ["base16-ocean.dark", "InspiredGitHub"]),
        )
        .await
        .expect("second");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provisioner.constructions(), 1);

        create_engine(
            provisioner.clone(),
            &registry,
            EngineConfig::new(["python"], ["base16-ocean.dark"]),
        )
        .await
        .expect("third");
        assert_eq!(provisioner.constructions(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_join_one_construction() {
        let provisioner = stub_provisioner();
        let registry = Arc::new(EngineRegistry::new());
        let mut handles = Vec::new();
        for index in 0..8 {
            let provisioner: Arc<dyn EngineProvisioner> = provisioner.clone();
            let registry = registry.clone();
            let languages = if index % 2 == 0 {
                vec!["rust", "javascript"]
            } else {
                vec!["javascript", "rust"]
            };
            handles.push(tokio::spawn(async move {
                let config = EngineConfig::new(languages, ["InspiredGitHub"]);
                create_engine(provisioner, &registry, config).await
            }));
        }
        let engines: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("join").expect("engine"))
            .collect();
        assert!(engines.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(provisioner.constructions(), 1);
    }

    #[tokio::test]
    async fn disposed_key_is_rebuilt_on_next_request() {
        let provisioner = stub_provisioner();
        let registry = EngineRegistry::new();
        let config = EngineConfig::new(["rust"], ["InspiredGitHub"]);
        create_engine(provisioner.clone(), &registry, config.clone())
            .await
            .expect("first");
        assert!(registry.dispose(&config.cache_key("stub")));
        create_engine(provisioner.clone(), &registry, config)
            .await
            .expect("rebuilt");
        assert_eq!(provisioner.constructions(), 2);
    }

    #[tokio::test]
    async fn bundled_source_shares_one_singleton() {
        let provisioner = stub_provisioner();
        let registry = Arc::new(EngineRegistry::new());
        let source = EngineSource::bundled_with_registry(provisioner.clone(), registry.clone());
        let themes = vec![ThemeSource::Named("InspiredGitHub".to_string())];
        let a = source
            .acquire(None, &LoadPayload::Bundled("rust".to_string()), &themes)
            .await
            .expect("a");
        let b = source
            .acquire(None, &LoadPayload::Bundled("python".to_string()), &themes)
            .await
            .expect("b");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provisioner.constructions(), 1);
        let requests = provisioner.requests.lock().expect("requests");
        assert_eq!(requests[0], ProvisionRequest::default());
    }

    #[tokio::test]
    async fn unknown_language_retries_with_plaintext() {
        let registry = Arc::new(EngineRegistry::new());
        let source = EngineSource::bundled_with_registry(stub_provisioner(), registry);
        let themes = vec![ThemeSource::Named("InspiredGitHub".to_string())];
        let engine = source
            .acquire(None, &LoadPayload::Bundled("cobol-2090".to_string()), &themes)
            .await
            .expect("plaintext retry succeeds");
        assert!(!engine.supports_language("cobol-2090"));
    }

    #[tokio::test]
    async fn broken_custom_grammar_falls_back_but_missing_theme_propagates() {
        let registry = Arc::new(EngineRegistry::new());
        let source = EngineSource::bundled_with_registry(stub_provisioner(), registry);
        let broken = Arc::new(CustomGrammar {
            name: "mylang".to_string(),
            scope_name: "source.mylang".to_string(),
            file_types: Vec::new(),
            aliases: Vec::new(),
            definition: String::new(),
        });
        let themes = vec![ThemeSource::Named("InspiredGitHub".to_string())];
        source
            .acquire(None, &LoadPayload::Custom(broken), &themes)
            .await
            .expect("grammar failure degrades");

        let missing = vec![ThemeSource::Named("no-such-theme".to_string())];
        let err = source
            .acquire(None, &LoadPayload::Bundled("rust".to_string()), &missing)
            .await
            .expect_err("theme failure propagates");
        assert_eq!(err, HighlightError::ThemeNotFound("no-such-theme".to_string()));
    }

    fn grammar(name: &str, definition: &str) -> Arc<CustomGrammar> {
        Arc::new(CustomGrammar {
            name: name.to_string(),
            scope_name: format!("source.{name}"),
            file_types: Vec::new(),
            aliases: vec!["rust".to_string()],
            definition: definition.to_string(),
        })
    }

    fn unnamed_theme(fg: &str) -> Arc<ThemeDefinition> {
        Arc::new(
            serde_json::from_value(serde_json::json!({
                "fg": fg,
                "bg": "#101010",
                "tokenColors": []
            }))
            .expect("theme json"),
        )
    }

    #[tokio::test]
    async fn custom_grammar_stays_out_of_the_shared_engine() {
        let provisioner = stub_provisioner();
        let registry = Arc::new(EngineRegistry::new());
        let source = EngineSource::bundled_with_registry(provisioner.clone(), registry.clone());
        let themes = vec![ThemeSource::Named("InspiredGitHub".to_string())];

        let shared = source
            .acquire(None, &LoadPayload::Bundled("rust".to_string()), &themes)
            .await
            .expect("shared");
        let overlay = source
            .acquire(None, &LoadPayload::Custom(grammar("hijack", "v1")), &themes)
            .await
            .expect("overlay");
        assert!(!Arc::ptr_eq(&shared, &overlay));
        assert!(overlay.supports_language("hijack"));
        assert!(!shared.supports_language("hijack"));

        let again = source
            .acquire(None, &LoadPayload::Bundled("rust".to_string()), &themes)
            .await
            .expect("shared again");
        assert!(Arc::ptr_eq(&shared, &again));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn overlays_are_keyed_by_payload_content() {
        let provisioner = stub_provisioner();
        let registry = Arc::new(EngineRegistry::new());
        let source = EngineSource::bundled_with_registry(provisioner.clone(), registry.clone());
        let themes = vec![ThemeSource::Named("InspiredGitHub".to_string())];

        let first = source
            .acquire(None, &LoadPayload::Custom(grammar("glowy", "v1")), &themes)
            .await
            .expect("v1");
        let same = source
            .acquire(None, &LoadPayload::Custom(grammar("glowy", "v1")), &themes)
            .await
            .expect("v1 again");
        let changed = source
            .acquire(None, &LoadPayload::Custom(grammar("glowy", "v2")), &themes)
            .await
            .expect("v2");
        assert!(Arc::ptr_eq(&first, &same));
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(provisioner.constructions(), 2);
    }

    #[tokio::test]
    async fn unnamed_custom_themes_do_not_overwrite_each_other() {
        let registry = Arc::new(EngineRegistry::new());
        let source = EngineSource::bundled_with_registry(stub_provisioner(), registry);
        let red = vec![ThemeSource::Custom(unnamed_theme("#ff0000"))];
        let blue = vec![ThemeSource::Custom(unnamed_theme("#0000ff"))];

        let (a, b) = tokio::join!(
            source.acquire(None, &LoadPayload::None, &red),
            source.acquire(None, &LoadPayload::None, &blue),
        );
        let (a, b) = (a.expect("red"), b.expect("blue"));
        assert_eq!(a.theme_metadata("custom").expect("red").foreground, "#ff0000");
        assert_eq!(b.theme_metadata("custom").expect("blue").foreground, "#0000ff");
    }

    #[tokio::test]
    async fn supplied_source_requires_an_engine() {
        let source = EngineSource::Supplied;
        assert_eq!(source.check(None), Err(HighlightError::MissingEngine));
        let err = source
            .acquire(None, &LoadPayload::None, &[])
            .await
            .expect_err("missing engine");
        assert_eq!(err, HighlightError::MissingEngine);

        let engine: Arc<dyn HighlightEngine> = Arc::new(StubEngine::new(&["rust"], &["t"]));
        assert!(source.check(Some(&engine)).is_ok());
        let acquired = source
            .acquire(
                Some(engine.clone()),
                &LoadPayload::Bundled("rust".to_string()),
                &[ThemeSource::Named("t".to_string())],
            )
            .await
            .expect("supplied engine");
        assert!(Arc::ptr_eq(&acquired, &engine));
    }
}
