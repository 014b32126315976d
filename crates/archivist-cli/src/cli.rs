use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "archivist",
    version,
    about = "Incremental file archiving to S3-compatible object storage",
    after_help = "\
Environment variables:
  ARCHIVIST_ACCESS_KEY_ID       Store access key (instead of --key-id)
  ARCHIVIST_SECRET_ACCESS_KEY   Store secret key (instead of --key-secret)"
)]
pub(crate) struct Cli {
    /// Directory to archive / restore into
    #[arg(short, long, default_value = ".")]
    pub directory: String,

    /// Bucket holding bundles and the manifest
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Endpoint URL of the S3-compatible store
    #[arg(short = 'u', long = "endpoint-url")]
    pub endpoint_url: Option<String>,

    /// Store region
    #[arg(short, long, default_value = "us-east-1")]
    pub region: String,

    /// Access key id
    #[arg(short = 'i', long = "key-id", env = "ARCHIVIST_ACCESS_KEY_ID")]
    pub key_id: Option<String>,

    /// Secret access key
    #[arg(
        short = 'k',
        long = "key-secret",
        env = "ARCHIVIST_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    pub key_secret: Option<String>,

    /// Key prefix inside the bucket
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// Accept a plain-http endpoint (credentials travel unencrypted)
    #[arg(long)]
    pub allow_insecure_http: bool,

    /// Manifest file name (kept inside the directory and the store)
    #[arg(short, long, default_value = "archived_files.state")]
    pub state_file: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Pack new files into bundles and upload them
    Archive {
        /// Base name for produced bundles
        #[arg(short, long, default_value = "archive")]
        name: String,

        /// Soft cap on cumulative member bytes per bundle
        #[arg(short, long, default_value_t = 1024 * 1024 * 1024)]
        max_size: u64,
    },

    /// Restore files the manifest knows about that are missing locally
    Extract,

    /// Delete files older than a threshold from configured locations
    Sweep {
        /// JSON file mapping system names to sweep targets
        #[arg(short, long)]
        config: String,

        /// System to sweep, or "all"
        #[arg(short = 'S', long)]
        system: String,

        /// Age threshold, e.g. 30d, 12h, 1w, 6M
        #[arg(short, long)]
        age: String,
    },
}
