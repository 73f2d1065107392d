//! Command-line highlighter over the codeglow bundles.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use codeglow::language::CustomGrammar;
use codeglow::{
    EngineSource, HighlightConfig, HighlightOutput, HighlightRequest, Highlighted,
    HighlighterOptions, LanguageInput, OutputFormat, ThemeInput,
};
use serde_json::Value;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum Bundle {
    #[default]
    Full,
    Web,
}

#[derive(Debug, Parser)]
#[command(name = "codeglow", about = "Syntax-highlight source code", version)]
struct Cli {
    /// Source file (reads stdin when omitted)
    file: Option<PathBuf>,

    /// Language id, alias or plaintext marker
    #[arg(short, long)]
    lang: Option<String>,

    /// Theme name, inline JSON theme/variant map, or path to a JSON theme file
    #[arg(short, long, env = "CODEGLOW_THEME")]
    theme: Option<String>,

    /// Output format: tree, markup or tokens
    #[arg(short, long, default_value = "markup", value_parser = parse_format)]
    format: OutputFormat,

    /// Annotate lines for line-number rendering
    #[arg(short = 'n', long)]
    line_numbers: bool,

    /// First line number
    #[arg(long, default_value_t = 1)]
    start: u32,

    /// Grammar/theme bundle
    #[arg(short, long, value_enum, default_value_t = Bundle::Full)]
    bundle: Bundle,

    /// Alias mapping `name=target`, repeatable
    #[arg(long = "alias", value_parser = parse_alias)]
    aliases: Vec<(String, String)>,

    /// Sublime-syntax grammar file registered as a custom language
    #[arg(long)]
    grammar: Option<PathBuf>,

    /// Print the resolved language label to stderr
    #[arg(long)]
    show_label: bool,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codeglow=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn parse_format(value: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(value)
        .ok_or_else(|| format!("unknown format '{}' (expected tree, markup or tokens)", value))
}

fn parse_alias(value: &str) -> Result<(String, String), String> {
    let Some((name, target)) = value.split_once('=') else {
        return Err(format!("alias '{}' must look like name=target", value));
    };
    let (name, target) = (name.trim(), target.trim());
    if name.is_empty() || target.is_empty() {
        return Err(format!("alias '{}' has an empty side", value));
    }
    Ok((name.to_string(), target.to_string()))
}

/// Interpret `--theme`: inline JSON, a JSON file, or a theme name.
fn parse_theme_arg(value: &str) -> anyhow::Result<ThemeInput> {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        let json: Value = serde_json::from_str(trimmed).context("parsing inline theme JSON")?;
        return Ok(ThemeInput::from_json(&json));
    }
    let path = Path::new(trimmed);
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading theme file {}", path.display()))?;
        let json: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing theme file {}", path.display()))?;
        return Ok(ThemeInput::from_json(&json));
    }
    Ok(ThemeInput::from(trimmed))
}

fn load_grammar(path: &Path) -> anyhow::Result<CustomGrammar> {
    let definition = std::fs::read_to_string(path)
        .with_context(|| format!("reading grammar {}", path.display()))?;
    let Some(name) = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.split('.').next())
        .filter(|stem| !stem.is_empty())
    else {
        bail!("cannot derive a language name from {}", path.display());
    };
    Ok(CustomGrammar {
        name: name.to_string(),
        scope_name: format!("source.{}", name),
        file_types: vec![name.to_string()],
        aliases: Vec::new(),
        definition,
    })
}

fn read_source(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading source {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("reading stdin")?;
            Ok(buffer)
        }
    }
}

fn language_from_file(file: Option<&Path>) -> Option<String> {
    file.and_then(Path::extension)
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
}

fn build_request(cli: &Cli, code: String) -> anyhow::Result<HighlightRequest> {
    let grammar = cli.grammar.as_deref().map(load_grammar).transpose()?;
    let language = match (&cli.lang, &grammar) {
        (Some(lang), _) => Some(LanguageInput::from(lang.as_str())),
        (None, Some(grammar)) => Some(LanguageInput::from(grammar.clone())),
        (None, None) => language_from_file(cli.file.as_deref()).map(LanguageInput::from),
    };
    let theme = match &cli.theme {
        Some(value) => parse_theme_arg(value)?,
        None => ThemeInput::from(HighlightConfig::from_env().default_theme),
    };
    let options = HighlighterOptions {
        custom_languages: grammar.into_iter().map(Arc::new).collect(),
        lang_alias: cli.aliases.iter().cloned().collect(),
        output_format: cli.format,
        show_line_numbers: cli.line_numbers,
        starting_line_number: cli.start,
        ..Default::default()
    };
    Ok(HighlightRequest {
        code,
        language,
        theme,
        options,
    })
}

fn render_output(highlighted: &Highlighted) -> anyhow::Result<String> {
    match &highlighted.output {
        HighlightOutput::Markup(html) => Ok(html.clone()),
        HighlightOutput::Tree(node) => {
            serde_json::to_string_pretty(node).context("encoding tree output")
        }
        HighlightOutput::Tokens(tokens) => {
            serde_json::to_string_pretty(tokens).context("encoding token output")
        }
    }
}

fn engine_source(bundle: Bundle) -> EngineSource {
    match bundle {
        Bundle::Full => codeglow::full::source(),
        Bundle::Web => codeglow::web::source(),
    }
}

async fn run(cli: &Cli) -> anyhow::Result<(Highlighted, String)> {
    let code = read_source(cli.file.as_deref())?;
    let request = build_request(cli, code)?;
    debug!(
        bundle = ?cli.bundle,
        format = ?cli.format,
        bytes = request.code.len(),
        "highlighting"
    );
    let highlighted = codeglow::highlight(&engine_source(cli.bundle), &request)
        .await
        .context("highlighting failed")?;
    let rendered = render_output(&highlighted)?;
    Ok((highlighted, rendered))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let (highlighted, rendered) = run(&cli).await?;
    if cli.show_label {
        eprintln!("language: {}", highlighted.label());
    }
    println!("{}", rendered);
    Ok(())
}
