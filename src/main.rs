use clap::{Args, Parser, Subcommand};
use static_s3::compilers::SubprocessCompiler;
use static_s3::config::{self, ConfigError, StaticConfig};
use static_s3::digest::DigestMode;
use static_s3::output;
use static_s3::pipeline::{CompileOptions, Pipeline, PipelineError};
use static_s3::remote::S3Store;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "static-s3")]
#[command(about = "Bundle static assets and deploy them to S3 under content digests")]
#[command(long_about = "\
Bundle static assets and deploy them to S3 under content digests

The project root holds static-s3.toml and a static directory:

  static-s3.toml                   # Optional; 'static-s3 gen-config' prints one
  static/
  ├── bundles.toml                 # Manifest: [script] and [style] bundles
  ├── js/                          # Script sources
  │   └── templates/               # Templates, compiled to script
  ├── css/                         # Style sources, preprocessed into css/compiled/
  ├── img/                         # Images, uploaded as they are
  └── bundles/                     # Compiled artifacts (script/, style/)

compile rebuilds only stale bundles. deploy uploads every bundle and every
image absent from the bucket, under names embedding their MD5 digest.

Set RUST_LOG=static_s3=debug for a trace of every decision.")]
#[command(version)]
struct Cli {
    /// Config file; its directory is the project root
    #[arg(long, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct CompileArgs {
    /// Discard the compiled style mirror and rebuild every bundle
    #[arg(long)]
    force: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild stale bundles into static/bundles
    Compile(CompileArgs),
    /// Upload bundles and images to the configured bucket
    Deploy,
    /// Print the content digest of every bundle artifact and image
    Digests {
        /// Only hash images (bundle artifacts need not exist)
        #[arg(long)]
        images_only: bool,
    },
    /// Show which style sources and bundles are stale, without compiling
    Status,
    /// Print a stock static-s3.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
        command => run(&cli.config, command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", e.class(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &Path, command: Command) -> Result<(), PipelineError> {
    let project_root = project_root(config_path);
    let config =
        config::load_config_file(config_path)?.with_env(|name| std::env::var(name).ok());
    let mut pipeline = Pipeline::from_config(&config, &project_root)?;

    match command {
        Command::Compile(args) => {
            let layout = pipeline.layout();
            let templates = SubprocessCompiler::from_command_line(
                &config.compilers.template,
                layout.root(),
                layout.template_dir(),
            )?;
            let styles = SubprocessCompiler::from_command_line(
                &config.compilers.style,
                layout.root(),
                layout.compiled_style_dir(),
            )?;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_compile_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline.compile(
                &templates,
                &styles,
                CompileOptions { force: args.force },
                Some(tx),
            );
            printer.join().ok();
            output::print_compile_summary(&result?);
        }
        Command::Deploy => {
            let store = open_store(&config)?;
            let uploads = config::effective_uploads(&config.deploy);
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_deploy_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline.deploy(&store, uploads, Some(tx));
            printer.join().ok();
            output::print_deploy_summary(&result?);
        }
        Command::Digests { images_only } => {
            let mode = if images_only {
                DigestMode::ImagesOnly
            } else {
                DigestMode::Full
            };
            output::print_digests(&pipeline.digests(mode)?);
        }
        Command::Status => {
            output::print_status(&pipeline.status()?);
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

/// The config file's directory. A bare file name means the current directory.
fn project_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn open_store(config: &StaticConfig) -> Result<S3Store, PipelineError> {
    if !config.remote.enabled {
        return Err(PipelineError::RemoteDisabled);
    }
    let credentials = config.remote.credentials()?;
    let (Some(bucket), Some(endpoint)) = (config.remote.bucket(), config.remote.endpoint()) else {
        return Err(ConfigError::Validation("remote.bucket is required to deploy".into()).into());
    };
    Ok(S3Store::new(&endpoint, bucket, credentials))
}
