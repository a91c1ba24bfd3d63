use clap::Parser;
use eyre::{Context, Result, eyre};
use log::LevelFilter;
use notes_image_extract::extractor;
use notes_image_extract::utils::{self, ExtractConfig, IMAGES_ONLY_ENV};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const ROOT_ENV: &str = "NOTES_EXPORT_ROOT";

/// Extract inline base64 images from raw note HTML exports.
/// Normally run with no arguments; everything can come from the environment.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Export root containing raw/, html/ and data/.
    /// Falls back to $NOTES_EXPORT_ROOT, then config, then ~/Documents/NotesExport.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/notes-image-extract/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write images straight into the root and skip processed HTML.
    /// Also enabled by NOTES_EXPORT_IMAGES_ONLY=true.
    #[arg(long)]
    images_only: bool,

    /// Treat raw/ and html/ as flat, ignoring notebooks.
    #[arg(long, conflicts_with = "subdirs")]
    flat: bool,

    /// Treat raw/ and html/ as split into per-notebook directories.
    #[arg(long)]
    subdirs: bool,

    /// Show debug output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    root_directory: Option<PathBuf>,
    use_subdirectories: Option<bool>,
}

fn default_root() -> PathBuf {
    dirs::document_dir()
        .map(|d| d.join("NotesExport"))
        .unwrap_or_else(|| PathBuf::from("NotesExport"))
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("notes-image-extract/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format(|buf, record| match record.level() {
            log::Level::Error => writeln!(buf, "Error: {}", record.args()),
            log::Level::Warn => writeln!(buf, "Warning: {}", record.args()),
            log::Level::Info => writeln!(buf, "{}", record.args()),
            _ => writeln!(buf, "[debug] {}", record.args()),
        })
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve root (CLI > env > config > default)
    let root = cli
        .root
        .or_else(|| std::env::var_os(ROOT_ENV).map(PathBuf::from))
        .or(file_cfg.root_directory)
        .unwrap_or_else(default_root);

    // 3. Resolve mode and layout
    let images_only =
        cli.images_only || utils::images_only_flag(std::env::var(IMAGES_ONLY_ENV).ok().as_deref());
    let subdirs = match (cli.flat, cli.subdirs) {
        (true, _) => Some(false),
        (_, true) => Some(true),
        _ => file_cfg.use_subdirectories,
    };

    let config = ExtractConfig {
        root,
        images_only,
        subdirs,
    };

    // 4. Run the extraction
    let summary = extractor::execute(config)?;
    log::debug!("{:?}", summary);
    Ok(())
}
