//! Request pipeline and the reactive binding that re-runs it.
//!
//! [`highlight`] runs one request end to end. [`HighlightBinding`] owns the
//! per-binding state (stabilized request, throttle, liveness of the latest
//! run) and publishes results through a watch channel.

use crate::bundle::EngineSource;
use crate::config::HighlightConfig;
use crate::constants::{
    DEFAULT_CSS_VARIABLE_PREFIX, DEFAULT_STARTING_LINE_NUMBER, PLAINTEXT, TRACE_TARGET,
};
use crate::engine::{
    Decoration, DefaultColor, HighlightEngine, MergeWhitespaces, Structure, ThemeSelection,
    TokenizeOptions, Transformer,
};
use crate::error::HighlightError;
use crate::language::{is_plaintext, resolve_language, AliasTable, CustomGrammar, LanguageInput};
use crate::scheduler::{ErrorReporter, Throttle};
use crate::stable::StableValue;
use crate::theme::{resolve_theme, ThemeInput, ThemeResolution};
use crate::transform::{transform_output, HighlightOutput, LineNumbers, OutputFormat};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Options passed through to every tokenize call.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub transformers: Vec<Arc<dyn Transformer>>,
    pub decorations: Vec<Decoration>,
    pub merge_whitespaces: MergeWhitespaces,
    pub structure: Structure,
    pub tokenize_max_line_length: Option<usize>,
    pub tokenize_time_limit: Option<Duration>,
    /// Multi-theme only: which variant renders as plain `color`.
    pub default_color: DefaultColor,
    pub css_variable_prefix: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            transformers: Vec::new(),
            decorations: Vec::new(),
            merge_whitespaces: MergeWhitespaces::default(),
            structure: Structure::default(),
            tokenize_max_line_length: None,
            tokenize_time_limit: None,
            default_color: DefaultColor::default(),
            css_variable_prefix: DEFAULT_CSS_VARIABLE_PREFIX.to_string(),
        }
    }
}

impl PartialEq for EngineOptions {
    fn eq(&self, other: &Self) -> bool {
        self.transformers.len() == other.transformers.len()
            && self
                .transformers
                .iter()
                .zip(&other.transformers)
                .all(|(a, b)| Arc::ptr_eq(a, b))
            && self.decorations == other.decorations
            && self.merge_whitespaces == other.merge_whitespaces
            && self.structure == other.structure
            && self.tokenize_max_line_length == other.tokenize_max_line_length
            && self.tokenize_time_limit == other.tokenize_time_limit
            && self.default_color == other.default_color
            && self.css_variable_prefix == other.css_variable_prefix
    }
}

/// Caller options for one highlight request.
#[derive(Debug, Clone)]
pub struct HighlighterOptions {
    /// Minimum spacing between runs; `None` runs every change on the next tick.
    pub delay: Option<Duration>,
    pub custom_languages: Vec<Arc<CustomGrammar>>,
    pub lang_alias: AliasTable,
    pub output_format: OutputFormat,
    /// Caller engine; required by [`EngineSource::Supplied`].
    pub highlighter: Option<Arc<dyn HighlightEngine>>,
    pub show_line_numbers: bool,
    pub starting_line_number: u32,
    pub engine: EngineOptions,
}

impl Default for HighlighterOptions {
    fn default() -> Self {
        Self {
            delay: None,
            custom_languages: Vec::new(),
            lang_alias: AliasTable::new(),
            output_format: OutputFormat::default(),
            highlighter: None,
            show_line_numbers: false,
            starting_line_number: DEFAULT_STARTING_LINE_NUMBER,
            engine: EngineOptions::default(),
        }
    }
}

impl PartialEq for HighlighterOptions {
    fn eq(&self, other: &Self) -> bool {
        let same_engine = match (&self.highlighter, &other.highlighter) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_engine
            && self.delay == other.delay
            && self.custom_languages == other.custom_languages
            && self.lang_alias == other.lang_alias
            && self.output_format == other.output_format
            && self.show_line_numbers == other.show_line_numbers
            && self.starting_line_number == other.starting_line_number
            && self.engine == other.engine
    }
}

/// One highlight request; a new request supersedes any in-flight one.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightRequest {
    pub code: String,
    pub language: Option<LanguageInput>,
    pub theme: ThemeInput,
    pub options: HighlighterOptions,
}

impl HighlightRequest {
    pub fn new(
        code: impl Into<String>,
        language: impl Into<LanguageInput>,
        theme: impl Into<ThemeInput>,
    ) -> Self {
        Self {
            code: code.into(),
            language: Some(language.into()),
            theme: theme.into(),
            options: HighlighterOptions::default(),
        }
    }

    pub fn with_options(mut self, options: HighlighterOptions) -> Self {
        self.options = options;
        self
    }
}

/// Published result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    pub output: HighlightOutput,
    /// Id the engine actually tokenized with.
    pub language_id: String,
    pub display_language_id: Option<String>,
    pub theme_id: String,
}

impl Highlighted {
    /// Label for display: what the caller asked for, else the engine id.
    pub fn label(&self) -> &str {
        self.display_language_id
            .as_deref()
            .unwrap_or(self.language_id.as_str())
    }
}

/// Resolve the theme, substituting `default_theme` for unusable input.
fn resolve_theme_or_default(theme: &ThemeInput, default_theme: &str) -> ThemeResolution {
    let resolution = resolve_theme(theme);
    if resolution.themes_to_load.is_empty() {
        debug!(
            target: TRACE_TARGET,
            event = "theme_default",
            theme = default_theme,
            "no usable theme; using default"
        );
        return resolve_theme(&ThemeInput::Named(default_theme.to_string()));
    }
    resolution
}

fn theme_selection(themes: &ThemeResolution, engine: &EngineOptions) -> ThemeSelection {
    if themes.is_multi_theme {
        ThemeSelection::Multi {
            variants: themes
                .variants
                .iter()
                .map(|(variant, source)| (variant.clone(), source.id().to_string()))
                .collect(),
            default_color: engine.default_color.clone(),
            css_variable_prefix: engine.css_variable_prefix.clone(),
        }
    } else {
        ThemeSelection::Single(themes.theme_id.clone())
    }
}

fn tokenize_options(lang: &str, theme: ThemeSelection, engine: &EngineOptions) -> TokenizeOptions {
    TokenizeOptions {
        transformers: engine.transformers.clone(),
        decorations: engine.decorations.clone(),
        merge_whitespaces: engine.merge_whitespaces,
        structure: engine.structure,
        tokenize_max_line_length: engine.tokenize_max_line_length,
        tokenize_time_limit: engine.tokenize_time_limit,
        ..TokenizeOptions::new(lang, theme)
    }
}

/// Highlight one request with configuration from the environment.
///
/// # Errors
/// [`HighlightError::MissingEngine`] before any work for a supplied source
/// without an engine; otherwise acquisition and engine errors.
pub async fn highlight(
    source: &EngineSource,
    request: &HighlightRequest,
) -> Result<Highlighted, HighlightError> {
    highlight_with_config(source, request, &HighlightConfig::from_env()).await
}

/// Highlight one request.
///
/// Resolves language and theme, acquires an engine, substitutes plaintext
/// when the engine cannot tokenize the language, and renders `output_format`
/// on a blocking thread.
///
/// # Arguments
/// - `source`: Engine acquisition strategy.
/// - `request`: Code, language, theme and options.
/// - `config`: Defaults such as the fallback theme.
///
/// # Returns
/// The rendered output with the engine and display language ids.
///
/// # Errors
/// [`HighlightError::MissingEngine`], provisioning, theme and tokenize errors.
pub async fn highlight_with_config(
    source: &EngineSource,
    request: &HighlightRequest,
    config: &HighlightConfig,
) -> Result<Highlighted, HighlightError> {
    let options = &request.options;
    source.check(options.highlighter.as_ref())?;

    let started = Instant::now();
    let language = resolve_language(
        request.language.as_ref(),
        &options.custom_languages,
        &options.lang_alias,
    );
    let themes = resolve_theme_or_default(&request.theme, &config.default_theme);

    let engine = source
        .acquire(
            options.highlighter.clone(),
            &language.load_payload,
            &themes.themes_to_load,
        )
        .await?;

    let language_id = if is_plaintext(&language.language_id)
        || engine.supports_language(&language.language_id)
    {
        language.language_id.clone()
    } else {
        debug!(
            target: TRACE_TARGET,
            event = "plaintext_fallback",
            language = %language.language_id,
            "engine cannot tokenize language"
        );
        PLAINTEXT.to_string()
    };

    let tokenize = tokenize_options(
        &language_id,
        theme_selection(&themes, &options.engine),
        &options.engine,
    );
    let line_numbers = options.show_line_numbers.then_some(LineNumbers {
        start: options.starting_line_number,
    });
    let format = options.output_format;
    let is_multi_theme = themes.is_multi_theme;
    let code = request.code.clone();
    let output = tokio::task::spawn_blocking(move || {
        transform_output(
            format,
            engine.as_ref(),
            &code,
            tokenize,
            is_multi_theme,
            line_numbers,
        )
    })
    .await??;

    debug!(
        target: TRACE_TARGET,
        event = "highlighted",
        language = %language_id,
        theme = %themes.theme_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "highlight complete"
    );
    Ok(Highlighted {
        output,
        language_id,
        display_language_id: language.display_language_id,
        theme_id: themes.theme_id,
    })
}

/// Cleanup returned by an effect action.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Runs an action when its dependencies change by content.
///
/// The previous action's cleanup runs before the next action and on
/// [`Effect::teardown`] or drop.
pub struct Effect<D> {
    deps: Option<D>,
    cleanup: Option<Cleanup>,
}

impl<D> Default for Effect<D> {
    fn default() -> Self {
        Self {
            deps: None,
            cleanup: None,
        }
    }
}

impl<D: fmt::Debug> fmt::Debug for Effect<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("deps", &self.deps)
            .field("has_cleanup", &self.cleanup.is_some())
            .finish()
    }
}

impl<D: PartialEq> Effect<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` if `deps` differ from the last run's.
    ///
    /// # Returns
    /// `Ok(true)` when the action ran.
    ///
    /// # Errors
    /// Propagates the action's error; the dependencies are then not recorded
    /// so the next call runs again.
    pub fn run<F, E>(&mut self, deps: D, action: F) -> Result<bool, E>
    where
        F: FnOnce(&D) -> Result<Option<Cleanup>, E>,
    {
        if self.deps.as_ref() == Some(&deps) {
            return Ok(false);
        }
        self.run_cleanup();
        self.cleanup = action(&deps)?;
        self.deps = Some(deps);
        Ok(true)
    }

    fn run_cleanup(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }

    /// Run the last cleanup and forget the dependencies.
    pub fn teardown(&mut self) {
        self.run_cleanup();
        self.deps = None;
    }
}

impl<D> Drop for Effect<D> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// Long-lived binding that re-highlights when its request changes.
pub struct HighlightBinding {
    source: EngineSource,
    config: HighlightConfig,
    request: StableValue<HighlightRequest>,
    effect: Effect<u64>,
    throttle: Throttle,
    published: Arc<watch::Sender<Option<Highlighted>>>,
}

impl fmt::Debug for HighlightBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighlightBinding")
            .field("source", &self.source)
            .field("revision", &self.request.revision())
            .field("effect", &self.effect)
            .finish()
    }
}

/// Right of one run to publish its result.
///
/// The flag is read and cleared while holding the watch sender's lock, so a
/// run revoked by a newer update or by teardown can never publish afterwards.
struct RunSlot {
    live: AtomicBool,
    published: Arc<watch::Sender<Option<Highlighted>>>,
}

impl RunSlot {
    fn new(published: Arc<watch::Sender<Option<Highlighted>>>) -> Self {
        Self {
            live: AtomicBool::new(true),
            published,
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Publish `highlighted` unless revoked; returns whether it was published.
    fn publish(&self, highlighted: Highlighted) -> bool {
        let mut highlighted = Some(highlighted);
        self.published.send_if_modified(|current| {
            if !self.is_live() {
                return false;
            }
            *current = highlighted.take();
            true
        })
    }

    fn revoke(&self) {
        self.published.send_if_modified(|_| {
            self.live.store(false, Ordering::SeqCst);
            false
        });
    }
}

impl HighlightBinding {
    /// Binding configured from the environment.
    pub fn new(source: EngineSource) -> Self {
        Self::with_config(source, HighlightConfig::from_env())
    }

    pub fn with_config(source: EngineSource, config: HighlightConfig) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            source,
            config,
            request: StableValue::new(),
            effect: Effect::new(),
            throttle: Throttle::new(),
            published: Arc::new(published),
        }
    }

    /// Replace the error reporter for failed runs (default: log).
    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.throttle = Throttle::with_reporter(reporter);
        self
    }

    fn trace(&self, event: &str, details: &str) {
        if !self.config.trace {
            return;
        }
        info!(target: TRACE_TARGET, event = event, details = details, "highlight trace");
    }

    /// Submit the latest request.
    ///
    /// Requests equal by content to the previous one are ignored. Otherwise
    /// the previous run loses its right to publish and a new run is scheduled
    /// through the throttle.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Returns
    /// `true` when a new run was scheduled.
    ///
    /// # Errors
    /// [`HighlightError::MissingEngine`] immediately for a supplied source
    /// without an engine; [`HighlightError::Poisoned`] from the throttle.
    pub fn update(&mut self, request: HighlightRequest) -> Result<bool, HighlightError> {
        self.source.check(request.options.highlighter.as_ref())?;
        let (request, revision) = self.request.stabilize_owned(request);

        let Self {
            source,
            config,
            effect,
            throttle,
            published,
            ..
        } = self;
        let scheduled = effect.run(revision, |_| {
            let slot = Arc::new(RunSlot::new(Arc::clone(published)));
            let run_slot = Arc::clone(&slot);
            let source = source.clone();
            let config = config.clone();
            let run_request = Arc::clone(&request);
            let operation = move || async move {
                let published = match highlight_with_config(&source, &run_request, &config).await {
                    Ok(highlighted) => run_slot.publish(highlighted),
                    Err(err) if run_slot.is_live() => return Err(err),
                    Err(_) => false,
                };
                if !published {
                    debug!(
                        target: TRACE_TARGET,
                        event = "drop",
                        revision,
                        "superseded run dropped"
                    );
                }
                Ok(())
            };
            throttle.schedule(operation, request.options.delay.unwrap_or(Duration::ZERO))?;
            let cleanup: Cleanup = Box::new(move || slot.revoke());
            Ok::<_, HighlightError>(Some(cleanup))
        })?;

        let details = format!("revision={revision} scheduled={scheduled}");
        self.trace("update", details.as_str());
        Ok(scheduled)
    }

    /// Latest published result.
    pub fn current(&self) -> Option<Highlighted> {
        self.published.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Highlighted>> {
        self.published.subscribe()
    }

    /// Cancel the pending run and stop in-flight runs from publishing.
    pub fn teardown(&mut self) {
        self.throttle.cancel();
        self.effect.teardown();
        self.trace("teardown", "binding torn down");
    }
}

impl Drop for HighlightBinding {
    fn drop(&mut self) {
        self.teardown();
    }
}
