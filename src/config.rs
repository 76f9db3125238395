use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mural", about = "A headless client for the Mural bulletin board")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long)]
    pub server: Option<String>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in and store the session
    Login {
        #[arg(long)]
        user: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Create a new account
    Register {
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Print the current post feed
    Posts,
    /// Publish a new post
    Post {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// Server-side image path to attach
        #[arg(long)]
        image: Option<String>,
    },
    /// React to a post (like, love or haha)
    React { post_id: String, kind: String },
    /// Follow the live feed until interrupted (SIGHUP forces a refresh)
    Follow,
    /// Shared files
    Files {
        #[command(subcommand)]
        action: FilesCommand,
    },
    /// Birthday calendar
    Birthdays {
        #[command(subcommand)]
        action: CalendarCommand,
    },
    /// Vacation calendar
    Vacations {
        #[command(subcommand)]
        action: CalendarCommand,
    },
    /// Register this installation for push notifications
    Subscribe,
    /// Fetch an application-shell resource through the offline cache
    Shell { path: String },
}

#[derive(Subcommand, Debug)]
pub enum FilesCommand {
    /// List shared files
    List,
    /// Upload a local file
    Upload { path: PathBuf },
    /// Download a shared file
    Download {
        name: String,
        /// Write to this path instead of the file name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CalendarCommand {
    /// List entries
    List,
    /// Add an entry (date format YYYY-MM-DD; vacations take start and end)
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        date: String,
        /// End date, vacations only
        #[arg(long)]
        end: Option<String>,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub push: PushConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub ws_path: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Application-shell resources populated at worker install time.
    pub shell: Vec<String>,
    /// Overrides the built-in cache generation tag.
    pub generation: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PushConfig {
    /// Stands in for notification permission: nothing subscribes while false.
    pub enabled: bool,
    /// Push relay base URL; the backend brokers push when unset.
    pub relay_url: Option<String>,
    /// Overrides the built-in application-server key.
    pub vapid_public_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            ws_path: "/ws".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shell: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
            ],
            generation: None,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            relay_url: None,
            vapid_public_key: None,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref server) = cli.server {
            config.server.url = server.clone();
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .expect("Could not determine home directory")
                .join(".mural")
        })
    }
}
