//! Artifact Sign CLI
//!
//! Entry point for the `artifact-sign` command-line tool.

use artifact_sign::config::{user_config_path, TomlSettingsStore, PROJECT_CONFIG_FILE};
use artifact_sign::key::{format_fingerprint, format_key_id};
use artifact_sign::{
    EffectiveConfig, Environment, SignError, SignResult, SigningSession, SessionOutcome,
    SourceArtifact,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "artifact-sign")]
#[command(about = "Detached OpenPGP signatures for build artifacts", version)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign artifact files
    Sign {
        /// Artifact id used in signature file names
        #[arg(long)]
        artifact_id: String,

        /// Artifact version (used in names with --include-version)
        #[arg(long)]
        version: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        options: ConfigArgs,

        /// Files to sign, optionally FILE=CLASSIFIER
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Load the signing key and show what would sign
    KeyInfo {
        /// Output in JSON format
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        options: ConfigArgs,
    },

    /// Print the effective configuration with secrets redacted
    Config {
        #[command(flatten)]
        options: ConfigArgs,
    },
}

/// Flags that override configuration values
#[derive(Args, Default)]
struct ConfigArgs {
    /// Project config file (default: .artifact-sign.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Settings file with server records (default: ~/.config/artifact-sign/settings.toml)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Skip signing entirely
    #[arg(long)]
    skip: bool,

    /// Fail instead of skipping when no key is available
    #[arg(long)]
    require_key: bool,

    /// Meaning of a configured key file that does not exist
    #[arg(long, value_parser = ["unavailable", "error"])]
    missing_key_file: Option<String>,

    /// Put the version into signature file names
    #[arg(long)]
    include_version: bool,

    /// Directory for signature files (default: target)
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Glob of artifact files not to sign (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Signing threads, 0 = CPU count
    #[arg(long)]
    workers: Option<usize>,

    /// Server id in the settings file holding the key
    #[arg(long)]
    key_server_id: Option<String>,

    /// Key id (hex)
    #[arg(long)]
    key_id: Option<String>,

    /// Key file path
    #[arg(long)]
    key_file: Option<String>,
}

impl ConfigArgs {
    /// CLI layer of the configuration merge
    fn overrides(&self) -> Value {
        let mut root = Map::new();
        if self.skip {
            root.insert("skip".into(), json!(true));
        }
        if self.require_key {
            root.insert("skip_no_key".into(), json!(false));
        }
        if let Some(policy) = &self.missing_key_file {
            root.insert("missing_key_file".into(), json!(policy));
        }
        if self.include_version {
            root.insert("include_version".into(), json!(true));
        }
        if let Some(dir) = &self.output_dir {
            root.insert("output_dir".into(), json!(dir.to_string_lossy()));
        }
        if !self.exclude.is_empty() {
            root.insert("exclude".into(), json!(self.exclude));
        }
        if let Some(workers) = self.workers {
            root.insert("workers".into(), json!(workers));
        }

        let mut key = Map::new();
        if let Some(server_id) = &self.key_server_id {
            key.insert("server_id".into(), json!(server_id));
        }
        if let Some(id) = &self.key_id {
            key.insert("id".into(), json!(id));
        }
        if let Some(file) = &self.key_file {
            key.insert("file".into(), json!(file));
        }
        if !key.is_empty() {
            root.insert("key".into(), Value::Object(key));
        }

        Value::Object(root)
    }

    fn effective_config(&self, env: &Environment) -> SignResult<EffectiveConfig> {
        let user = user_config_path(env);
        let project = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
        Ok(EffectiveConfig::build(
            user.as_deref(),
            Some(project.as_path()),
            Some(self.overrides()),
        )?)
    }

    fn settings_store(&self, env: &Environment) -> SignResult<Option<TomlSettingsStore>> {
        let (path, explicit) = match &self.settings {
            Some(path) => (Some(path.clone()), true),
            None => (
                env.home_dir()
                    .map(|home| home.join(".config/artifact-sign/settings.toml")),
                false,
            ),
        };

        match path {
            Some(path) if explicit || path.exists() => {
                Ok(Some(TomlSettingsStore::load(&path)?))
            }
            _ => Ok(None),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let env = Environment::process();
    let result = match cli.command {
        Commands::Sign {
            artifact_id,
            version,
            json,
            options,
            files,
        } => run_sign(&env, &options, &artifact_id, version.as_deref(), &files, json),
        Commands::KeyInfo { json, options } => run_key_info(&env, &options, json),
        Commands::Config { options } => run_config(&env, &options),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", anyhow::Error::from(e));
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// `path[=classifier]`
fn parse_artifact(artifact_id: &str, version: Option<&str>, arg: &str) -> SourceArtifact {
    let (path, classifier) = match arg.rsplit_once('=') {
        Some((path, classifier))
            if !classifier.is_empty() && !classifier.contains(std::path::is_separator) =>
        {
            (path, Some(classifier))
        }
        _ => (arg, None),
    };

    let mut artifact = SourceArtifact::from_file(artifact_id, Path::new(path));
    if let Some(classifier) = classifier {
        artifact = artifact.with_classifier(classifier);
    }
    if let Some(version) = version {
        artifact = artifact.with_version(version);
    }
    artifact
}

fn run_sign(
    env: &Environment,
    options: &ConfigArgs,
    artifact_id: &str,
    version: Option<&str>,
    files: &[String],
    json: bool,
) -> SignResult<()> {
    let config = options.effective_config(env)?;
    let settings = options.settings_store(env)?;

    let artifacts: Vec<_> = files
        .iter()
        .map(|arg| parse_artifact(artifact_id, version, arg))
        .collect();
    for artifact in &artifacts {
        if let Some(file) = &artifact.file {
            if !file.is_file() {
                return Err(SignError::io(
                    file,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "artifact file not found"),
                ));
            }
        }
    }

    let mut session = SigningSession::new(config.settings(), env);
    if let Some(settings) = &settings {
        session = session.with_settings(settings);
    }
    let outcome = session.run(&artifacts)?;

    if json {
        println!("{}", to_json(&outcome)?);
        return Ok(());
    }

    match &outcome {
        SessionOutcome::Skipped { reason } => println!("Signing skipped: {:?}", reason),
        SessionOutcome::Signed { signatures } => {
            for signature in signatures {
                println!("{}", signature.file.display());
            }
        }
    }
    Ok(())
}

fn run_key_info(env: &Environment, options: &ConfigArgs, json: bool) -> SignResult<()> {
    let config = options.effective_config(env)?;
    let settings = options.settings_store(env)?;

    let mut session = SigningSession::new(config.settings(), env);
    if let Some(settings) = &settings {
        session = session.with_settings(settings);
    }
    let key = session.load_key()?;

    let fingerprint = format_fingerprint(key.fingerprint());
    let master = key.master_fingerprint().map(format_fingerprint);
    let expires = key.expires_at().map(|at| at.to_rfc3339());

    if json {
        let value = json!({
            "key_id": format_key_id(key.key_id()),
            "fingerprint": fingerprint,
            "master_fingerprint": master,
            "user_ids": key.user_ids(),
            "created_at": key.created_at().to_rfc3339(),
            "expires_at": expires,
        });
        println!("{}", to_json(&value)?);
        return Ok(());
    }

    println!("Key id:      {}", format_key_id(key.key_id()));
    println!("Fingerprint: {}", fingerprint);
    if let Some(master) = master {
        println!("Subkey of:   {}", master);
    }
    for user_id in key.user_ids() {
        println!("User id:     {}", user_id);
    }
    println!("Created:     {}", key.created_at().to_rfc3339());
    println!(
        "Expires:     {}",
        expires.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

fn run_config(env: &Environment, options: &ConfigArgs) -> SignResult<()> {
    let config = options.effective_config(env)?;
    let json = config
        .to_json()
        .map_err(|e| SignError::Config(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> SignResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| SignError::Config(e.to_string()))
}
