//! Reliquary CLI - unpack sealed game archives and patch executable aliases.
//!
//! This is the main entry point for the Reliquary command-line application.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sysinfo::Disks;
use tracing_subscriber::EnvFilter;

use reliquary::bhd::bhd5::Bhd5Reader;
use reliquary::bhd::{crypto, sniff};
use reliquary::common::hash;
use reliquary::prelude::*;

/// Reliquary - sealed game archive unpacker
#[derive(Parser)]
#[command(name = "reliquary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unpack every archive of a title next to its executable
    Unpack(UnpackArgs),

    /// Neutralize archive aliases inside a game executable
    Patch {
        /// Path to the game executable
        #[arg(short, long, env = "RELIQUARY_EXE")]
        exe: PathBuf,

        /// Title profile (JSON)
        #[arg(short, long, env = "RELIQUARY_PROFILE")]
        profile: PathBuf,
    },

    /// Print the name hash of one or more paths
    Hash {
        /// Paths to hash
        #[arg(required = true)]
        paths: Vec<String>,

        /// Dictionary used to report whether each hash is known
        #[arg(short, long, env = "RELIQUARY_DICTIONARY")]
        dictionary: Option<PathBuf>,
    },

    /// Decrypt a protected archive index
    Decrypt {
        /// Encrypted index file
        #[arg(short, long)]
        input: PathBuf,

        /// PEM public key for the archive
        #[arg(short, long)]
        key: PathBuf,

        /// Output file for the plaintext index
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Guess the extension of extracted files from their content
    Sniff {
        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct UnpackArgs {
    /// Game directory containing the .bhd/.bdt pairs
    #[arg(short, long, env = "RELIQUARY_GAME_DIR")]
    game_dir: PathBuf,

    /// Title profile (JSON)
    #[arg(short, long, env = "RELIQUARY_PROFILE")]
    profile: PathBuf,

    /// Path dictionary, one path per line
    #[arg(short, long, env = "RELIQUARY_DICTIONARY")]
    dictionary: PathBuf,

    /// Directory holding <archive>.pem sidecar keys (defaults to the game directory)
    #[arg(long, env = "RELIQUARY_KEY_DIR")]
    key_dir: Option<PathBuf>,

    /// Explicit archive key as ARCHIVE=PEM_FILE; disables sidecar lookup
    #[arg(short, long = "key", value_name = "ARCHIVE=PEM_FILE")]
    keys: Vec<String>,

    /// Ceiling on bytes held by outstanding writes, in MiB
    #[arg(long, default_value_t = 100, env = "RELIQUARY_WRITE_LIMIT_MB")]
    write_limit_mb: u64,

    /// Number of writer threads
    #[arg(short, long, env = "RELIQUARY_THREADS")]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Unpack(args) => {
            cmd_unpack(args)?;
        }
        Commands::Patch { exe, profile } => {
            cmd_patch(&exe, &profile)?;
        }
        Commands::Hash { paths, dictionary } => {
            cmd_hash(&paths, dictionary.as_deref())?;
        }
        Commands::Decrypt { input, key, output } => {
            cmd_decrypt(&input, &key, &output)?;
        }
        Commands::Sniff { files } => {
            cmd_sniff(&files)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Progress bar driven by engine reports.
struct BarSink(ProgressBar);

const BAR_STEPS: u64 = 1000;

impl ProgressSink for BarSink {
    fn report(&self, fraction: f64, message: &str) {
        self.0.set_position((fraction * BAR_STEPS as f64).round() as u64);
        self.0.set_message(message.to_string());
    }
}

/// Build a context whose progress goes to a bar and which Ctrl+C cancels.
fn interactive_context() -> Result<(Context, ProgressBar)> {
    let pb = ProgressBar::new(BAR_STEPS);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
            .progress_chars("#>-"),
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt, finishing outstanding writes...");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let ctx = Context::new(Arc::new(BarSink(pb.clone())), cancel);
    Ok((ctx, pb))
}

fn load_profile(path: &Path) -> Result<GameProfile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse profile {}", path.display()))
}

fn parse_keys(args: &[String]) -> Result<StaticKeyStore> {
    let mut store = StaticKeyStore::new();
    for arg in args {
        let (archive, pem_path) = arg
            .split_once('=')
            .with_context(|| format!("Invalid key argument {arg:?}, expected ARCHIVE=PEM_FILE"))?;
        let key = ArchiveKey::load(pem_path)
            .with_context(|| format!("Failed to read key file {pem_path}"))?;
        store.insert(archive, key);
    }
    Ok(store)
}

fn cmd_unpack(args: UnpackArgs) -> Result<()> {
    let profile = load_profile(&args.profile)?;

    let start = Instant::now();
    let dictionary = HashDictionary::load(&args.dictionary)
        .with_context(|| format!("Failed to read dictionary {}", args.dictionary.display()))?;
    tracing::info!(entries = dictionary.len(), elapsed = ?start.elapsed(), "loaded dictionary");

    let keys: Box<dyn KeyStore> = if args.keys.is_empty() {
        let dir = args.key_dir.clone().unwrap_or_else(|| args.game_dir.clone());
        Box::new(SidecarKeyStore::new(dir))
    } else {
        Box::new(parse_keys(&args.keys)?)
    };

    let defaults = UnpackOptions::default();
    let options = UnpackOptions {
        write_limit: args.write_limit_mb.saturating_mul(1024 * 1024),
        writer_threads: args.threads.unwrap_or(defaults.writer_threads),
        ..defaults
    };

    warn_if_short_on_space(&args.game_dir, &profile);

    let session = UnpackSession {
        game_dir: &args.game_dir,
        profile: &profile,
        dictionary: &dictionary,
        keys: &*keys,
    };

    let (ctx, pb) = interactive_context()?;
    let start = Instant::now();
    let outcome = Unpacker::with_options(Arc::new(Bhd5Reader), options)
        .unpack(&ctx, &session)
        .context("Unpacking failed")?;

    match outcome {
        UnpackOutcome::Completed(archives) => {
            pb.finish_with_message("Unpacking complete!");
            for (archive, outcome) in &archives {
                match outcome {
                    ArchiveOutcome::Unpacked(stats) => println!(
                        "{archive}: {} written, {} skipped, {} unknown ({} files)",
                        stats.written, stats.skipped, stats.unknown, stats.files
                    ),
                    ArchiveOutcome::Missing => println!("{archive}: not found, skipped"),
                    ArchiveOutcome::Cancelled(_) => println!("{archive}: cancelled"),
                }
            }
            println!("Unpacking completed in {:?}", start.elapsed());
        }
        UnpackOutcome::Cancelled => {
            pb.abandon_with_message("Unpacking cancelled");
        }
    }

    Ok(())
}

/// Free bytes on the filesystem holding `path`, if it can be determined.
fn available_space(path: &Path) -> Option<u64> {
    let canonical = fs::canonicalize(path).ok();
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| {
            let mount = disk.mount_point();
            path.starts_with(mount) || canonical.as_deref().is_some_and(|p| p.starts_with(mount))
        })
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

fn warn_if_short_on_space(game_dir: &Path, profile: &GameProfile) {
    let Some(available) = available_space(game_dir) else {
        tracing::debug!(game_dir = %game_dir.display(), "could not determine free space");
        return;
    };

    const GIB: f64 = (1024 * 1024 * 1024) as f64;
    if profile.space_shortfall(available).is_some() {
        tracing::warn!(
            "{} GB of free space is required to fully unpack this game; only {:.1} GB available. \
             A partial unpack that restores some files may still succeed.",
            profile.required_gb,
            available as f64 / GIB
        );
    } else {
        tracing::debug!(available, required = profile.required_bytes(), "enough free space");
    }
}

fn cmd_patch(exe: &Path, profile_path: &Path) -> Result<()> {
    let profile = load_profile(profile_path)?;
    let (ctx, pb) = interactive_context()?;

    match ExePatcher::patch(&ctx, exe, &profile).context("Patching failed")? {
        PatchOutcome::Patched { occurrences } => {
            pb.finish_with_message("Patching complete!");
            println!(
                "Replaced {occurrences} occurrences of {} aliases in {}",
                profile.replacements.len(),
                exe.display()
            );
        }
        PatchOutcome::Cancelled => {
            pb.abandon_with_message("Patching cancelled");
        }
    }

    Ok(())
}

fn cmd_hash(paths: &[String], dictionary: Option<&Path>) -> Result<()> {
    let dictionary = dictionary
        .map(|path| {
            HashDictionary::load(path)
                .with_context(|| format!("Failed to read dictionary {}", path.display()))
        })
        .transpose()?;

    for path in paths {
        let normalized = hash::normalize(path);
        let name_hash = PathHash::of(path);
        match dictionary.as_ref().map(|d| d.get(name_hash)) {
            Some(Some(known)) => println!("{name_hash}  {normalized}  (known as {known})"),
            Some(None) => println!("{name_hash}  {normalized}  (not in dictionary)"),
            None => println!("{name_hash}  {normalized}"),
        }
    }

    Ok(())
}

fn cmd_decrypt(input: &Path, key_path: &Path, output: &Path) -> Result<()> {
    println!("Decrypting: {} -> {}", input.display(), output.display());

    let key = ArchiveKey::load(key_path)
        .with_context(|| format!("Failed to read key file {}", key_path.display()))?;
    let file = File::open(input).context("Failed to open input file")?;

    let start = Instant::now();
    let plain = crypto::decrypt_index(std::io::BufReader::new(file), &key)
        .context("Failed to decrypt index")?
        .into_inner();
    fs::write(output, &plain).context("Failed to write output file")?;

    println!("Decrypted {} bytes in {:?}", plain.len(), start.elapsed());

    Ok(())
}

fn cmd_sniff(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match sniff::sniff(&data) {
            Some(ext) => println!("{}: {ext}", path.display()),
            None => println!("{}: unknown", path.display()),
        }
    }

    Ok(())
}
