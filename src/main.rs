//! usenet-post - concurrent yEnc/NNTP binary poster
//!
//! Entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use usenet_post::{Config, Error, PostOptions, Result, SubjectMode};

/// Post binary files to Usenet and generate an NZB index
#[derive(Parser, Debug)]
#[command(name = "usenet-post", version, about)]
struct Cli {
    /// Use an alternative config file (default: ~/.usenet-post.json)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use directory names as subjects
    #[arg(short = 'd', long)]
    dir_subjects: bool,

    /// Subject to use
    #[arg(short = 's', long)]
    subject: Option<String>,

    /// Newsgroup(s) to post to, separate multiple with a comma
    #[arg(short = 'g', long)]
    groups: Option<String>,

    /// String placed at the start of every subject line (a space is added)
    #[arg(long)]
    prefix: Option<String>,

    /// The `From` address to put on posts
    #[arg(long)]
    from: Option<String>,

    /// Hostname to use in generated message-ids
    #[arg(long, default_value = "usenet-post")]
    host: String,

    /// NZB output path
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Record an archive password in the NZB head metadata
    #[arg(long, value_name = "PASSWORD")]
    password: Option<String>,

    /// Post only to the named server entry
    #[arg(long, value_name = "NAME")]
    server: Option<String>,

    /// Show verbose debug information
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Files and directories to post
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    tracing::info!("usenet-post {} starting", env!("CARGO_PKG_VERSION"));

    let subject = match (&cli.subject, cli.dir_subjects) {
        (_, true) => SubjectMode::DirectoryNames,
        (Some(subject), false) => SubjectMode::Literal(subject.clone()),
        (None, false) => {
            return Err(Error::Input(
                "need -d or -s to choose how subjects are derived".to_string(),
            ));
        }
    };

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    tracing::debug!("reading config from {}", config_path.display());
    let config = Config::load(&config_path)?;

    let options = PostOptions {
        subject,
        groups: cli.groups.as_deref().map(split_groups),
        prefix: cli.prefix.clone(),
        from: cli.from.clone(),
        host: cli.host.clone(),
        output: cli.output.clone(),
        meta_password: cli.password.clone(),
        server: cli.server.clone(),
    };

    usenet_post::run(&config, &options, &cli.paths).await?;
    Ok(())
}

fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| Error::config("cannot determine home directory for default config path"))?;
    Ok(PathBuf::from(home).join(".usenet-post.json"))
}

fn split_groups(groups: &str) -> Vec<String> {
    groups
        .split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_string)
        .collect()
}
