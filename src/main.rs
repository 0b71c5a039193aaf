//! Stile manifest CLI
//!
//! Entry point for the `stile-manifest` command-line tool.

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use stile_manifest::config::DEFAULT_CONFIG_FILE;
use stile_manifest::source::SourceError;
use stile_manifest::state::DEFAULT_STATE_FILE;
use stile_manifest::{
    BuildkiteSource, Diagnostics, EffectiveConfig, Environment, Locator, ManifestReader,
    ManifestState, Resolver, Settings, StateFile, ThreadSleeper,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Configuration could not be loaded or is invalid
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "stile-manifest")]
#[command(about = "Read build manifests published as Buildkite artifacts", version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a manifest and print its outputs
    Read {
        /// Path to config file (default: stile-manifest.toml if present)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Path to state file (default: .stile-manifest/state.json)
        #[arg(long)]
        state: Option<PathBuf>,

        /// Manifest artifact file name or id
        #[arg(long)]
        name: Option<String>,

        /// Build number of the manifest pipeline
        #[arg(long)]
        build: Option<u64>,

        /// Architecture to project
        #[arg(long)]
        architecture: Option<String>,

        /// File holding the fallback manifest JSON
        #[arg(long)]
        fallback_file: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print every artifact of a build as JSON
    List {
        /// Path to config file (default: stile-manifest.toml if present)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Build number of the manifest pipeline
        #[arg(long)]
        build: u64,
    },

    /// Verify and print the effective configuration
    Verify {
        /// Path to config file (default: stile-manifest.toml if present)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Read {
            config,
            state,
            name,
            build,
            architecture,
            fallback_file,
            json,
        } => {
            let overrides = match manifest_overrides(name, build, architecture, fallback_file.as_deref()) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    process::exit(EXIT_CONFIG);
                }
            };
            let state_path = state.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
            run_read(config, overrides, &state_path, json);
        }
        Commands::List { config, build } => {
            run_list(config, build);
        }
        Commands::Verify { config } => {
            run_verify(config);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "stile_manifest=debug"
    } else {
        "stile_manifest=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// CLI layer for the `[manifest]` table; only flags that were given
fn manifest_overrides(
    name: Option<String>,
    build: Option<u64>,
    architecture: Option<String>,
    fallback_file: Option<&Path>,
) -> Result<Option<Value>, String> {
    let mut manifest = Map::new();
    if let Some(name) = name {
        manifest.insert("manifest_name".to_string(), json!(name));
    }
    if let Some(build) = build {
        manifest.insert("bfp_build_number".to_string(), json!(build));
    }
    if let Some(architecture) = architecture {
        manifest.insert("architecture".to_string(), json!(architecture));
    }
    if let Some(path) = fallback_file {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read fallback manifest {}: {}", path.display(), e))?;
        manifest.insert("fallback_manifest".to_string(), json!(text));
    }

    if manifest.is_empty() {
        Ok(None)
    } else {
        Ok(Some(json!({ "manifest": manifest })))
    }
}

/// Explicit `--config` must exist; the default file is optional
fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    })
}

fn load_settings(config: Option<PathBuf>, overrides: Option<Value>) -> (EffectiveConfig, Settings) {
    let path = config_path(config);
    let effective = match EffectiveConfig::build(path.as_deref(), overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };
    match effective.settings() {
        Ok(settings) => (effective, settings),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CONFIG);
        }
    }
}

fn build_reader(settings: &Settings) -> Result<ManifestReader<BuildkiteSource, ThreadSleeper>, SourceError> {
    let source = BuildkiteSource::new(&settings.buildkite)?;
    let locator = Locator::new(source, settings.buildkite.per_page);
    let resolver = Resolver::with_thread_sleeper(locator, settings.retry);
    Ok(ManifestReader::new(resolver, &settings.buildkite))
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        eprintln!("{}", diagnostic);
    }
}

fn run_read(config: Option<PathBuf>, overrides: Option<Value>, state_path: &Path, json_output: bool) {
    let (_, settings) = load_settings(config, overrides);
    let inputs = match settings.manifest.require() {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };

    let previous = match StateFile::load_optional(state_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error loading state file {}: {}", state_path.display(), e);
            process::exit(EXIT_CONFIG);
        }
    };

    let reader = match build_reader(&settings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };

    let env = Environment::from_process();
    let report = reader.read_manifest(
        &inputs,
        StateFile::prior_used_fallback(previous.as_ref(), &inputs),
        &env,
        &mut io::stdout(),
    );
    print_diagnostics(&report.diagnostics);

    let Some(state) = report.state else {
        process::exit(1);
    };

    if let Err(e) = StateFile::new(state.clone()).write_to_file(state_path) {
        eprintln!("Error writing state file {}: {}", state_path.display(), e);
        process::exit(1);
    }

    if json_output {
        match serde_json::to_string_pretty(&state) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_state(&state);
    }

    process::exit(if report.diagnostics.has_errors() { 1 } else { 0 });
}

fn print_state(state: &ManifestState) {
    println!("Manifest: {}", state.inputs.manifest_name);
    println!("  Build: {}", state.inputs.bfp_build_number);
    if !state.inputs.architecture.is_empty() {
        println!("  Architecture: {}", state.inputs.architecture);
    }
    println!("  Name: {}", state.outputs.name);
    println!("  ID: {}", state.id);
    println!("  Used fallback: {}", state.used_fallback_manifest);

    if !state.outputs.amis.is_empty() {
        println!("  AMIs:");
        for (service, ami) in &state.outputs.amis {
            println!("    {}: {}", service, ami);
        }
    }
    if !state.outputs.service_versions.is_empty() {
        println!("  Service versions:");
        for (service, version) in &state.outputs.service_versions {
            println!("    {}: {}", service, version);
        }
    }
}

fn run_list(config: Option<PathBuf>, build: u64) {
    let (_, settings) = load_settings(config, None);
    let reader = match build_reader(&settings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };

    let diagnostics = reader.list_artifacts(build, &Environment::from_process(), &mut io::stdout());
    print_diagnostics(&diagnostics);
    process::exit(if diagnostics.has_errors() { 1 } else { 0 });
}

fn run_verify(config: Option<PathBuf>) {
    let (effective, settings) = load_settings(config, None);

    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }

    eprintln!("Configuration valid:");
    eprintln!("  Pipeline: {}/{}", settings.buildkite.org, settings.buildkite.pipeline);
    eprintln!(
        "  Retry: {} attempts, {}s apart (worst case {}s)",
        settings.retry.max_attempts,
        settings.retry.delay_seconds,
        settings.retry.worst_case_delay().as_secs()
    );
    if let Err(e) = settings.manifest.require() {
        eprintln!("  Note: {} (pass it to `read` on the command line)", e);
    }
}
