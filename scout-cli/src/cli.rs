use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use scout_engine::Channel;
use scout_engine::session::WaitUntil;

#[derive(Parser, Debug)]
#[command(
    name = "scout",
    version,
    about = "Find the streaming manifest URL a web page plays",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write logs to this directory (daily rotated)
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a page and report the first manifest URL it reveals
    Sniff(SniffArgs),

    /// Show or reset the configuration file
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,

        /// Overwrite the configuration file with defaults
        #[arg(long, conflicts_with = "show")]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SniffArgs {
    /// Page URL to open
    #[arg(env = "TARGET_URL")]
    pub url: Option<String>,

    /// Time budget in seconds
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Write found URLs, one per line, to this file
    #[arg(short = 'O', long, value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Manifest file extension to look for
    #[arg(long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Content type identifying a manifest (repeatable)
    #[arg(long = "content-type", value_name = "TYPE")]
    pub content_types: Vec<String>,

    /// Channels to attach (default: all)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub channels: Vec<Channel>,

    /// Page readiness navigation waits for
    #[arg(long, value_enum)]
    pub wait_until: Option<WaitUntil>,

    /// Do not try to start playback
    #[arg(long)]
    pub no_playback: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Chromium executable
    #[arg(long, value_name = "PATH", env = "CHROME_PATH")]
    pub chrome: Option<PathBuf>,

    /// Route browser traffic through this proxy
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Accept invalid TLS certificates (for intercepting proxies)
    #[arg(long)]
    pub ignore_cert_errors: bool,

    /// Disable the Chromium sandbox
    #[arg(long, env = "NO_SANDBOX")]
    pub no_sandbox: bool,

    /// Override the browser user agent
    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human readable, colored when attached to a terminal
    #[default]
    Pretty,
    /// Pretty-printed JSON report
    Json,
    /// Single-line JSON report
    JsonCompact,
    /// URLs only, one per line
    Text,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonCompact)
    }
}
