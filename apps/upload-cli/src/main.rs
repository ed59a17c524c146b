//! capyupload command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use capyupload_uploader::UploadOptionsOverrides;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Uploads a file in resumable parts. Rerun the same command to resume.
#[derive(Parser, Debug)]
#[command(name = "capyupload")]
#[command(version)]
struct Cli {
    /// File to upload
    file: PathBuf,

    /// Resume identity (defaults to the file name)
    #[arg(long)]
    identity: Option<String>,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Upload service URL (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Storage bucket (overrides config)
    #[arg(long)]
    bucket: Option<String>,

    /// Parts transferred at the same time (overrides config)
    #[arg(long)]
    concurrency: Option<usize>,

    /// MIME type sent on create (overrides config and detection)
    #[arg(long)]
    content_type: Option<String>,
}

impl Cli {
    /// Layers the command-line flags over a loaded configuration.
    fn apply(&self, mut config: config::Config) -> config::Config {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        config.upload = config.upload.merge(UploadOptionsOverrides {
            concurrency: self.concurrency,
            content_type: self.content_type.clone(),
            ..Default::default()
        });
        config
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting capyupload");

    let config = cli.apply(config::Config::load(cli.config.as_deref())?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, cli.file, cli.identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_and_flags() {
        let cli = Cli::try_parse_from([
            "capyupload",
            "movie.mkv",
            "--identity",
            "movie-v2",
            "--concurrency",
            "8",
            "--bucket",
            "media",
        ])
        .unwrap();
        assert_eq!(cli.file, PathBuf::from("movie.mkv"));
        assert_eq!(cli.identity.as_deref(), Some("movie-v2"));
        assert_eq!(cli.concurrency, Some(8));
        assert!(cli.endpoint.is_none());
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["capyupload"]).is_err());
    }

    #[test]
    fn flags_override_config_field_by_field() {
        let cli = Cli::try_parse_from([
            "capyupload",
            "a.bin",
            "--endpoint",
            "https://cli.test",
            "--concurrency",
            "2",
        ])
        .unwrap();
        let file_config: config::Config = toml::from_str(
            r#"
            endpoint = "https://file.test"
            bucket = "media"

            [upload]
            concurrency = 6
            max_parts = 50
            "#,
        )
        .unwrap();

        let config = cli.apply(file_config);
        assert_eq!(config.endpoint, "https://cli.test");
        assert_eq!(config.bucket, "media");
        let opts = config.upload_options();
        assert_eq!(opts.concurrency, 2);
        assert_eq!(opts.max_parts, 50);
    }
}
