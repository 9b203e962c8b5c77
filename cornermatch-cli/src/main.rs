use clap::Parser;
use cornermatch::image::io::{load_gray_image, save_gray_image};
use cornermatch::{
    ComputeBackend, DirectMatcher, FeatureDescriptor, FeatureGenerator, FeatureMatcher, Fixed,
    GeneratorConfig, HarrisConfig, IntegralMatcher, LocalBackend, MatchConfig, OffloadBackend,
    PATCH_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

/// Name of the library index written next to the patch images.
const MANIFEST_FILE: &str = "library.json";

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "CornerMatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Mode {
    BuildLibrary,
    Match,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum BackendKind {
    Float,
    Fixed,
    Offload,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum MatcherKind {
    Direct,
    Integral,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
struct HarrisConfigJson {
    derivative_sigma: f32,
    derivative_size: usize,
    smoothing_sigma: f32,
    smoothing_size: usize,
    k: f32,
    threshold: f32,
}

impl Default for HarrisConfigJson {
    fn default() -> Self {
        let cfg = HarrisConfig::default();
        Self {
            derivative_sigma: cfg.derivative_sigma,
            derivative_size: cfg.derivative_size,
            smoothing_sigma: cfg.smoothing_sigma,
            smoothing_size: cfg.smoothing_size,
            k: cfg.k,
            threshold: cfg.threshold,
        }
    }
}

impl From<HarrisConfigJson> for HarrisConfig {
    fn from(value: HarrisConfigJson) -> Self {
        Self {
            derivative_sigma: value.derivative_sigma,
            derivative_size: value.derivative_size,
            smoothing_sigma: value.smoothing_sigma,
            smoothing_size: value.smoothing_size,
            k: value.k,
            threshold: value.threshold,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
struct GeneratorConfigJson {
    max_features: usize,
    min_spacing: usize,
}

impl Default for GeneratorConfigJson {
    fn default() -> Self {
        let cfg = GeneratorConfig::default();
        Self {
            max_features: cfg.max_features,
            min_spacing: cfg.min_spacing,
        }
    }
}

impl From<GeneratorConfigJson> for GeneratorConfig {
    fn from(value: GeneratorConfigJson) -> Self {
        Self {
            max_features: value.max_features,
            min_spacing: value.min_spacing,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
struct MatchConfigJson {
    percentage: f32,
    threshold: f32,
}

impl Default for MatchConfigJson {
    fn default() -> Self {
        let cfg = MatchConfig::default();
        Self {
            percentage: cfg.percentage,
            threshold: cfg.threshold,
        }
    }
}

impl From<MatchConfigJson> for MatchConfig {
    fn from(value: MatchConfigJson) -> Self {
        Self {
            percentage: value.percentage,
            threshold: value.threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    mode: Mode,
    backend: BackendKind,
    matcher: MatcherKind,
    library_dir: String,
    library_images: Vec<String>,
    query_images: Vec<String>,
    output_path: Option<String>,
    harris: HarrisConfigJson,
    generator: GeneratorConfigJson,
    #[serde(rename = "match")]
    match_cfg: MatchConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Match,
            backend: BackendKind::Fixed,
            matcher: MatcherKind::Direct,
            library_dir: String::new(),
            library_images: Vec::new(),
            query_images: Vec::new(),
            output_path: None,
            harris: HarrisConfigJson::default(),
            generator: GeneratorConfigJson::default(),
            match_cfg: MatchConfigJson::default(),
        }
    }
}

impl Config {
    fn validate(&self) -> CliResult<()> {
        if self.library_dir.is_empty() {
            return Err("library_dir must be set in the config".into());
        }
        match self.mode {
            Mode::BuildLibrary if self.library_images.is_empty() => {
                Err("build_library needs at least one entry in library_images".into())
            }
            Mode::Match if self.query_images.is_empty() => {
                Err("match needs at least one entry in query_images".into())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ManifestEntry {
    file: String,
    row: usize,
    col: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct Manifest {
    patch_size: usize,
    features: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
struct LibraryOutput {
    library_dir: String,
    features: usize,
}

#[derive(Debug, Serialize)]
struct QueryRecord {
    image: String,
    accepted: bool,
    matched: usize,
    required: usize,
}

#[derive(Debug, Serialize)]
struct MatchOutput {
    library_len: usize,
    results: Vec<QueryRecord>,
}

fn build_library<B: ComputeBackend>(
    backend: B,
    config: &Config,
) -> CliResult<Vec<FeatureDescriptor>> {
    let mut generator =
        FeatureGenerator::new(config.harris.into(), config.generator.into(), backend)?;
    let mut library = Vec::new();
    for path in &config.library_images {
        let image = load_gray_image(path)?;
        let added = generator.extend_library(image.view(), &mut library)?;
        tracing::info!(image = %path, added, total = library.len(), "library image processed");
    }
    Ok(library)
}

fn save_library(dir: &Path, library: &[FeatureDescriptor]) -> CliResult<()> {
    fs::create_dir_all(dir)?;
    let mut features = Vec::with_capacity(library.len());
    for (index, descriptor) in library.iter().enumerate() {
        let file = format!("feature_{index:03}.png");
        save_gray_image(&descriptor.to_image()?, dir.join(&file))?;
        features.push(ManifestEntry {
            file,
            row: descriptor.row(),
            col: descriptor.col(),
        });
    }
    let manifest = Manifest {
        patch_size: PATCH_SIZE,
        features,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;
    Ok(())
}

fn load_library(dir: &Path) -> CliResult<Vec<FeatureDescriptor>> {
    let manifest: Manifest = serde_json::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
    if manifest.patch_size != PATCH_SIZE {
        return Err(format!(
            "library patches are {0}x{0}, expected {PATCH_SIZE}x{PATCH_SIZE}",
            manifest.patch_size
        )
        .into());
    }
    let mut library = Vec::with_capacity(manifest.features.len());
    for entry in &manifest.features {
        let patch = load_gray_image(dir.join(&entry.file))?;
        library.push(FeatureDescriptor::new(
            patch.pixels().to_vec(),
            entry.row,
            entry.col,
        )?);
    }
    Ok(library)
}

fn run_queries<M: FeatureMatcher>(
    mut matcher: M,
    library: &[FeatureDescriptor],
    queries: &[String],
) -> CliResult<Vec<QueryRecord>> {
    matcher.set_features(library)?;
    let mut results = Vec::with_capacity(queries.len());
    for path in queries {
        let image = load_gray_image(path)?;
        let outcome = matcher.try_match(image.view())?;
        tracing::info!(
            image = %path,
            accepted = outcome.accepted,
            matched = outcome.matched,
            "query matched"
        );
        results.push(QueryRecord {
            image: path.clone(),
            accepted: outcome.accepted,
            matched: outcome.matched,
            required: outcome.required,
        });
    }
    Ok(results)
}

fn match_with<B: ComputeBackend>(
    backend: B,
    config: &Config,
    library: &[FeatureDescriptor],
) -> CliResult<Vec<QueryRecord>> {
    match config.matcher {
        MatcherKind::Direct => run_queries(
            DirectMatcher::new(config.harris.into(), config.match_cfg.into(), backend)?,
            library,
            &config.query_images,
        ),
        MatcherKind::Integral => run_queries(
            IntegralMatcher::new(config.match_cfg.into(), backend)?,
            library,
            &config.query_images,
        ),
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("cornermatch=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    config.validate()?;
    let library_dir = PathBuf::from(&config.library_dir);

    let json = match config.mode {
        Mode::BuildLibrary => {
            let library = match config.backend {
                BackendKind::Float => build_library(LocalBackend::<f32>::new(), &config)?,
                BackendKind::Fixed => build_library(LocalBackend::<Fixed>::new(), &config)?,
                BackendKind::Offload => build_library(OffloadBackend::emulated()?, &config)?,
            };
            save_library(&library_dir, &library)?;
            serde_json::to_string_pretty(&LibraryOutput {
                library_dir: config.library_dir.clone(),
                features: library.len(),
            })?
        }
        Mode::Match => {
            let library = load_library(&library_dir)?;
            let results = match config.backend {
                BackendKind::Float => match_with(LocalBackend::<f32>::new(), &config, &library)?,
                BackendKind::Fixed => match_with(LocalBackend::<Fixed>::new(), &config, &library)?,
                BackendKind::Offload => match_with(OffloadBackend::emulated()?, &config, &library)?,
            };
            serde_json::to_string_pretty(&MatchOutput {
                library_len: library.len(),
                results,
            })?
        }
    };

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BackendKind, Config, MatcherKind, Mode, EXAMPLE_JSON};

    #[test]
    fn example_config_parses() {
        let config: Config = serde_json::from_str(EXAMPLE_JSON).unwrap();
        assert_eq!(config.mode, Mode::Match);
        assert_eq!(config.backend, BackendKind::Fixed);
        assert_eq!(config.matcher, MatcherKind::Integral);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_take_library_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "library_dir": "lib", "query_images": ["a.png"] }"#)
                .unwrap();
        assert_eq!(config.generator.max_features, 64);
        assert_eq!(config.match_cfg.percentage, 75.0);
        assert_eq!(config.harris.smoothing_size, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn build_mode_requires_images() {
        let config: Config =
            serde_json::from_str(r#"{ "mode": "build_library", "library_dir": "lib" }"#).unwrap();
        assert!(config.validate().is_err());
    }
}
