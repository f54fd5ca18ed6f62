//! Command-line interface definition for hrms.

use clap::{Parser, Subcommand};

/// hrms - talk to the HRMS API with a persisted, self-refreshing session
#[derive(Parser, Debug, Clone)]
#[command(name = "hrms")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override the API base URL
    #[arg(long, env = "HRMS_API_BASE_URL")]
    pub base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Store the access/refresh token pair issued at login
    Login {
        /// Username to remember for next time
        #[arg(short, long)]
        username: Option<String>,

        /// Access token (prompted for when omitted)
        #[arg(long)]
        access_token: Option<String>,

        /// Refresh token (prompted for when omitted)
        #[arg(long)]
        refresh_token: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show where requests go and whether a session is stored
    Status,

    /// GET a resource
    Get {
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query")]
        query: Vec<String>,
    },

    /// POST a JSON body
    Post { path: String, body: String },

    /// PUT a JSON body
    Put { path: String, body: String },

    /// PATCH a JSON body
    Patch { path: String, body: String },

    /// DELETE a resource
    Delete { path: String },
}

/// Split `key=value` query arguments.
pub fn parse_query(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Query parameter must be key=value: {}", pair))
        })
        .collect()
}
