mod config;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use parley_client::auth::{self, current_profile, current_user_id};
use parley_client::chat::{ChatContext, ChatSession};
use parley_client::prefs::{FilePreferences, PreferenceStore};
use parley_client::push::{
    PushTokenProvider, RandomTokenProvider, StaticTokenProvider, register_push_token,
};
use parley_client::users::{find_user, list_users};
use parley_gateway::{DocumentStore, LiveStore};
use parley_types::api::{SignInRequest, SignUpRequest};

use crate::config::Config;
use crate::render::TerminalRenderer;

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about = "One-to-one chat over a live document store", long_about = None)]
struct Args {
    /// Database file (overrides PARLEY_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory holding the session preferences (overrides PARLEY_PREFS_DIR)
    #[arg(long, global = true)]
    prefs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and sign in
    SignUp {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Profile picture file
        #[arg(long)]
        image: PathBuf,
    },
    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget this device's push token
    SignOut,
    /// List everyone you can chat with
    Users,
    /// Show the signed-in profile
    Whoami,
    /// Open a conversation. Lines read from stdin are sent; `/quit` leaves.
    Chat { peer_id: String },
    /// Register this device's push token
    Token {
        /// Fixed token (overrides PARLEY_PUSH_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,parley_client=debug,parley_gateway=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env().with_overrides(args.db, args.prefs_dir);

    let store: Arc<dyn DocumentStore> = Arc::new(
        LiveStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?,
    );
    let prefs = FilePreferences::open(&config.prefs_dir)?;
    info!(db = %config.db_path.display(), prefs = %prefs.path().display(), "Parley started");

    match args.command {
        Command::SignUp {
            first_name,
            last_name,
            email,
            password,
            image,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let req = SignUpRequest {
                first_name,
                last_name,
                email,
                password,
                image: B64.encode(bytes),
            };
            let profile = auth::sign_up(store.as_ref(), &prefs, req).await?;
            println!(
                "Signed up as {} {} ({})",
                profile.first_name, profile.last_name, profile.user_id
            );
            refresh_token(store.as_ref(), &prefs, &config, None).await;
        }
        Command::SignIn { email, password } => {
            let profile =
                auth::sign_in(store.as_ref(), &prefs, SignInRequest { email, password }).await?;
            println!("Signed in as {} {}", profile.first_name, profile.last_name);
            refresh_token(store.as_ref(), &prefs, &config, None).await;
        }
        Command::SignOut => {
            auth::sign_out(store.as_ref(), &prefs).await?;
            println!("Signed out");
        }
        Command::Users => {
            let me = current_user_id(&prefs)?;
            for user in list_users(store.as_ref(), &me).await? {
                println!("{}  {}  <{}>", user.id, user.display_name(), user.email);
            }
        }
        Command::Whoami => {
            let profile = current_profile(&prefs)?;
            println!(
                "{} {} ({})",
                profile.first_name, profile.last_name, profile.user_id
            );
        }
        Command::Chat { peer_id } => {
            let ctx = ChatContext {
                current_user_id: current_user_id(&prefs)?,
                peer: find_user(store.as_ref(), &peer_id).await?,
            };
            run_chat(store, ctx).await?;
        }
        Command::Token { token } => {
            if !refresh_token(store.as_ref(), &prefs, &config, token).await {
                anyhow::bail!("Unable to update Token");
            }
        }
    }

    Ok(())
}

/// Register the device token, printing the outcome. Returns whether it
/// was stored.
async fn refresh_token(
    store: &dyn DocumentStore,
    prefs: &dyn PreferenceStore,
    config: &Config,
    token: Option<String>,
) -> bool {
    let provider: Box<dyn PushTokenProvider> = match token.or_else(|| config.push_token.clone()) {
        Some(token) => Box::new(StaticTokenProvider::new(token)),
        None => Box::new(RandomTokenProvider::new()),
    };

    match register_push_token(store, prefs, provider.as_ref()).await {
        Ok(_) => {
            println!("Token updated successfully");
            true
        }
        Err(e) => {
            eprintln!("Unable to update Token: {e}");
            false
        }
    }
}

async fn run_chat(store: Arc<dyn DocumentStore>, ctx: ChatContext) -> Result<()> {
    println!(
        "Chatting with {}. Type a message and press enter, /quit to leave.",
        ctx.peer.display_name()
    );
    let renderer = TerminalRenderer::new(ctx.peer.first_name.clone());
    let session = ChatSession::open(store, ctx, renderer).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = session.send(line).await {
                    eprintln!("{e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close().await;
    Ok(())
}
