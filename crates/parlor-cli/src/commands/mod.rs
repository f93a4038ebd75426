//! CLI command definitions and dispatch.

pub mod auth;
pub mod chat;
pub mod rooms;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use parlor_client::ClientConfig;

use crate::context::Context;

/// Parlor: chat from the terminal
#[derive(Debug, Parser)]
#[command(name = "parlor", version, about, long_about = None)]
pub struct Cli {
    /// Backend origin, overriding PARLOR_ORIGIN
    #[arg(long, global = true)]
    pub origin: Option<String>,

    /// Directory holding the saved session, overriding PARLOR_STATE_DIR
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in (password from PARLOR_PASSWORD or a prompt)
    Login {
        /// Account id (email)
        user_id: String,
    },
    /// Create an account and sign in
    Register {
        /// Account id (email)
        user_id: String,
        /// Display name
        username: String,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List rooms
    Rooms,
    /// Create a room
    CreateRoom {
        /// Room name; defaults to room_<id>
        name: Option<String>,
    },
    /// Join a room and chat interactively
    Chat {
        room_id: String,
    },
}

impl Cli {
    pub fn config(&self) -> Result<ClientConfig> {
        self.apply_flags(ClientConfig::from_env()?)
    }

    /// Flags win over whatever the environment configured.
    fn apply_flags(&self, mut config: ClientConfig) -> Result<ClientConfig> {
        if let Some(origin) = &self.origin {
            config = config.with_origin(origin)?;
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        Ok(config)
    }

    pub async fn execute(&self) -> Result<()> {
        let context = Context::open(self.config()?)?;

        let outcome = match &self.command {
            Commands::Login { user_id } => auth::login(&context, user_id).await,
            Commands::Register { user_id, username } => {
                auth::register(&context, user_id, username).await
            }
            Commands::Logout => auth::logout(&context).await,
            Commands::Whoami => auth::whoami(&context),
            Commands::Rooms => rooms::list(&context).await,
            Commands::CreateRoom { name } => rooms::create(&context, name.as_deref()).await,
            Commands::Chat { room_id } => chat::run(&context, room_id).await,
        };

        // Refreshes can rotate cookies even when the command itself failed.
        context.save_cookies()?;
        outcome
    }
}
