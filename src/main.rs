// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, debug, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pseudocode_translator::app_config::{Config, LogLevel};
use pseudocode_translator::backends::BackendRegistry;
use pseudocode_translator::cache::{AstCache, AstCacheConfig};
use pseudocode_translator::translation::{BatchTranslator, TranslationManager, TranslationResult};
use pseudocode_translator::validation::Validator;

const CACHE_FILE_NAME: &str = "ast_cache.bin";
const HOT_ENTRY_COUNT: usize = 5;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a pseudocode document into Python
    Translate {
        /// Document mixing English instructions and Python
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Write the generated code here instead of stdout
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },

    /// Validate a Python file
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Translate every .txt, .pseudo and .md file under a directory
    Batch {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output directory (defaults to DIR)
        #[arg(short, long, value_name = "OUTDIR")]
        output: Option<PathBuf>,

        /// Documents translated concurrently
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show statistics of the persisted AST cache
    CacheStats,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Pseudocode Translator
///
/// Turns documents mixing English instructions and Python into a single
/// validated Python program.
#[derive(Parser, Debug)]
#[command(name = "pseudocode-translator")]
#[command(version)]
#[command(about = "Translate pseudocode documents into validated Python")]
#[command(long_about = "Translates documents that mix English instructions and Python into one Python program.
Instructions are translated by a generation backend, code is merged with deduplicated imports,
and the result is validated, with one automatic repair attempt when validation fails.

EXAMPLES:
    pseudocode-translator translate task.pseudo                 # Print the generated code
    pseudocode-translator translate task.pseudo -o task.py      # Write it to a file
    pseudocode-translator -b mock translate task.pseudo         # Use the offline mock backend
    pseudocode-translator validate script.py                    # Check an existing file
    pseudocode-translator batch tasks/ -o out/ -w 8             # Translate a whole directory
    pseudocode-translator completions bash > translator.bash    # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file does not exist,
    a default one is created. Command line flags override the file.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config: String,

    /// Generation backend (ollama, mock)
    #[arg(short, long, env = "PSEUDOCODE_BACKEND", global = true)]
    backend: Option<String>,

    /// Model name used by the backend
    #[arg(short, long, env = "PSEUDOCODE_MODEL", global = true)]
    model: Option<String>,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    fn glyph(level: Level) -> &'static str {
        match level {
            Level::Error => "✖",
            Level::Warn => "▲",
            Level::Info => "●",
            Level::Debug => "○",
            Level::Trace => "·",
        }
    }

    fn color(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::color(level),
                now,
                Self::glyph(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;
    let cli = CommandLineOptions::parse();

    if let Some(level) = cli.log_level {
        log::set_max_level(level_filter(level.into()));
    }

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "pseudocode-translator", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    if cli.log_level.is_none() {
        log::set_max_level(level_filter(config.log_level));
    }

    match cli.command {
        Commands::Translate { input, output } => run_translate(config, &input, output.as_deref()).await,
        Commands::Validate { file } => run_validate(config, &file),
        Commands::Batch { dir, output, workers } => run_batch(config, &dir, output.as_deref(), workers).await,
        Commands::CacheStats => run_cache_stats(config),
        Commands::Completions { .. } => Ok(()),
    }
}

/// Loads the config file, creating it with defaults when missing, then
/// applies command line overrides and validates the result
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let config_path = Path::new(&cli.config);
    let mut config = if config_path.exists() {
        Config::from_file(config_path)?
    } else {
        warn!("Config file not found at '{}', creating default config.", cli.config);
        let config = Config::default();
        config.save(config_path)?;
        config
    };

    if let Some(backend) = &cli.backend {
        config.backend.name = backend.clone();
    }
    if let Some(model) = &cli.model {
        config.backend.model = model.clone();
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if config.cache.persistence_path.is_none() {
        config.cache.persistence_path = default_cache_file();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

fn default_cache_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("pseudocode-translator").join(CACHE_FILE_NAME))
}

fn report(result: &TranslationResult) {
    for warning in &result.warnings {
        warn!("{}", warning);
    }
    for err in &result.errors {
        error!("{}", err);
    }
    for suggestion in &result.suggestions {
        info!("Suggestion: {}", suggestion);
    }
    debug!(
        "Backend '{}' used {} token(s); {} AST cache hit(s)",
        result.metadata.backend, result.metadata.tokens_used, result.metadata.cache_hits
    );
}

async fn run_translate(config: Config, input: &Path, output: Option<&Path>) -> Result<()> {
    let manager = TranslationManager::from_config(config, &BackendRegistry::default())?;
    manager.initialize().await.context("Failed to initialize the translator")?;

    let outcome = manager.translate_file(input).await;
    manager.shutdown().await;
    let result = outcome?;
    report(&result);

    if let Some(code) = &result.code {
        match output {
            Some(path) => {
                std::fs::write(path, code).with_context(|| format!("Failed to write file: {}", path.display()))?;
                info!("Success: {}", path.display());
            }
            None => print!("{}", code),
        }
    }

    if result.success {
        info!("{}", result.summary());
        Ok(())
    } else {
        Err(anyhow!(result.summary()))
    }
}

fn run_validate(config: Config, file: &Path) -> Result<()> {
    let code = std::fs::read_to_string(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let cache = Arc::new(AstCache::new(AstCacheConfig::from(&config.cache)));
    let validator = Validator::new(cache.clone(), &config);
    let result = validator.validate_all(&code);

    for warning in &result.warnings {
        warn!("{}", warning);
    }
    for err in &result.errors {
        error!("{}", err);
    }
    for suggestion in result.suggestions.iter().chain(validator.suggest_improvements(&code).iter()) {
        info!("Suggestion: {}", suggestion);
    }
    if let Err(e) = cache.save() {
        warn!("Failed to save AST cache: {}", e);
    }

    if result.is_valid() {
        info!("{} is valid", file.display());
        Ok(())
    } else {
        Err(anyhow!("{} has {} error(s)", file.display(), result.errors.len()))
    }
}

async fn run_batch(config: Config, dir: &Path, output: Option<&Path>, workers: Option<usize>) -> Result<()> {
    let workers = workers.unwrap_or(config.batch_workers);
    let manager = Arc::new(TranslationManager::from_config(config, &BackendRegistry::default())?);
    manager.initialize().await.context("Failed to initialize the translator")?;

    let output_dir = output.unwrap_or(dir);
    let batch = BatchTranslator::new(manager.clone(), workers).with_progress(true);
    let outcome = batch.translate_directory(dir, output_dir).await;
    manager.shutdown().await;
    let report = outcome?;

    for item in &report.outcomes {
        match (&item.result, &item.output) {
            (Ok(_), Some(path)) => info!("Success: {}", path.display()),
            (Ok(result), None) => warn!("{}: {}", item.source.display(), result.summary()),
            (Err(e), _) => error!("{}: {}", item.source.display(), e),
        }
    }

    if report.failed() == 0 {
        info!("{}", report.summary());
        Ok(())
    } else {
        Err(anyhow!(report.summary()))
    }
}

fn run_cache_stats(config: Config) -> Result<()> {
    let cache = AstCache::new(AstCacheConfig::from(&config.cache));
    let stats = cache.stats();
    match &config.cache.persistence_path {
        Some(path) => println!("Cache file:      {}", path.display()),
        None => println!("Cache file:      (none)"),
    }
    println!("Entries:         {}/{}", stats.size, stats.max_size);
    println!("Hits:            {}", stats.hits);
    println!("Misses:          {}", stats.misses);
    println!("Hit rate:        {:.1}%", stats.hit_rate());
    println!(
        "Evictions:       {} (capacity {}, ttl {}, memory {})",
        stats.evictions(),
        stats.evictions_capacity,
        stats.evictions_ttl,
        stats.evictions_memory
    );
    println!("Memory:          {:.2} MB", stats.memory_bytes as f64 / (1024.0 * 1024.0));

    let hot = cache.hot_entries(HOT_ENTRY_COUNT);
    if !hot.is_empty() {
        println!("Most accessed:");
        for entry in hot {
            let key: String = entry.key.chars().take(16).collect();
            println!("  {}…  {} access(es), ~{} bytes", key, entry.access_count, entry.size_estimate);
        }
    }
    Ok(())
}
