//! Kiln CLI - lint, compile and run untrusted code under a deadline
//!
//! Usage:
//!   kiln serve          Accept run requests over HTTP
//!   kiln run <file>     Run one file locally and print the result

mod request;
mod server;

use clap::{Parser, Subcommand};
use kiln_core::{Pipeline, PipelineConfig, StyleChecker, VariantKind};
use request::RunBody;
use server::{AppState, ServerOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Lint, compile and run untrusted code under a deadline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log failures and per-phase detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.kiln/config.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        #[arg(short, long, default_value_t = server::DEFAULT_PORT)]
        port: u16,

        /// Serve the web front end and move the endpoint to /run
        #[arg(short, long)]
        interactive: bool,

        /// Allow cross-origin requests
        #[arg(long)]
        cors: bool,

        /// Directory served in interactive mode
        #[arg(long)]
        webroot: Option<PathBuf>,
    },

    /// Run a source file and print the result as JSON
    Run {
        file: PathBuf,

        /// snippet, template, class or classes
        #[arg(long = "as", default_value = "snippet")]
        variant: String,

        /// auto, bytecode or interpreter
        #[arg(long, default_value = "auto")]
        compiler: String,

        /// Container holding the entry point
        #[arg(long)]
        class_name: Option<String>,

        /// Execution budget in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long)]
        indent_level: Option<usize>,

        /// Skip the style check
        #[arg(long)]
        no_lint: bool,
    },
}

/// Log level used when `RUST_LOG` is unset. Submission failures and
/// per-phase detail are only logged with `--verbose`; service faults always are.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(cli.verbose)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            interactive,
            cors,
            webroot,
        } => {
            let mut options = ServerOptions {
                interactive,
                cors,
                ..ServerOptions::default()
            };
            if let Some(webroot) = webroot {
                options.webroot = webroot;
            }
            server::serve(Arc::new(AppState::new(config)), options, port).await?;
        }

        Commands::Run {
            file,
            variant,
            compiler,
            class_name,
            timeout,
            indent_level,
            no_lint,
        } => {
            let source = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", file.display()))?;
            let kind: VariantKind = serde_json::from_value(serde_json::Value::String(variant.clone()))
                .map_err(|_| anyhow::anyhow!("unknown variant: {variant}"))?;
            let body = RunBody {
                source: Some(source),
                variant: Some(kind),
                compiler: Some(compiler),
                class_name,
                timeout,
                indent_level,
                run_checkstyle: Some(!no_lint),
                require_checkstyle: Some(!no_lint),
                ..RunBody::default()
            };
            let request = body.into_request()?;

            let record = tokio::task::spawn_blocking(move || {
                Pipeline::new(&config, Arc::new(StyleChecker), request).run()
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if !record.completed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::filter::LevelFilter;

    fn level(verbose: bool) -> Option<LevelFilter> {
        tracing_subscriber::EnvFilter::new(default_filter(verbose)).max_level_hint()
    }

    #[test]
    fn test_quiet_unless_verbose() {
        let quiet = level(false).unwrap();
        assert_eq!(quiet, LevelFilter::WARN);
        assert!(quiet < LevelFilter::from_level(Level::INFO));
        assert_eq!(level(true), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["kiln", "run", "Main.java", "--verbose"]).unwrap();
        assert!(cli.verbose);
        let cli = Cli::try_parse_from(["kiln", "serve"]).unwrap();
        assert!(!cli.verbose);
    }
}
