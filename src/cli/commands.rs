//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use system_status::config::DEFAULT_BIND;

#[derive(Parser)]
#[command(name = "system-status")]
#[command(about = "Live admin status feed and server log downloads", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Admin key for authentication
    #[arg(long, env = "SYSTEM_STATUS_ADMIN_KEY", global = true, hide_env_values = true)]
    pub admin_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the status server
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = DEFAULT_BIND, env = "SYSTEM_STATUS_BIND")]
        bind: String,

        /// Server log offered for download
        #[arg(long, env = "SYSTEM_STATUS_LOG_FILE")]
        log_file: PathBuf,

        /// Seconds a download token stays valid
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        token_ttl_secs: u64,
    },

    /// Print a freshly generated admin key
    Keygen,
}
