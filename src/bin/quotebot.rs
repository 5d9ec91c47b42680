//! quotebot CLI: run the bot and poke its moving parts from a terminal.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::info;

use quotebot::bot::{self, Bot};
use quotebot::config::Config;
use quotebot::quotes::{ArchiveClient, Quote, QuoteSource};
use quotebot::session::SessionStore;
use quotebot::telegram::{BotApi, ChatApi};
use quotebot::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "quotebot", about = "Telegram front-end for a web quote archive")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot: long polling, or webhook when configured
    Serve,
    /// Session store operations
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Quote archive operations
    Quote {
        #[command(subcommand)]
        action: QuoteAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List known chat sessions
    List,
    /// Show one chat's session in full
    Show { chat_id: i64 },
    /// Forget a chat entirely, saved quotes included
    Clear { chat_id: i64 },
}

#[derive(Subcommand)]
enum QuoteAction {
    /// Fetch a page of random quotes
    Random,
    /// Search the archive
    Search { text: String },
    /// Fetch one quote by id
    Show { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve => cmd_serve(config).await,
        Command::Session { action } => {
            let store = SessionStore::open(&config.session.db_path)?;
            match action {
                SessionAction::List => cmd_session_list(&store),
                SessionAction::Show { chat_id } => cmd_session_show(&store, chat_id),
                SessionAction::Clear { chat_id } => {
                    store.delete_chat(chat_id)?;
                    println!("Cleared chat {chat_id}");
                    Ok(())
                }
            }
        }
        Command::Quote { action } => {
            let archive = ArchiveClient::new(config.archive.base_url);
            match action {
                QuoteAction::Random => print_quotes(archive.random().await?),
                QuoteAction::Search { text } => print_quotes(archive.search(&text).await?),
                QuoteAction::Show { id } => {
                    println!("{}", archive.by_id(&id).await?.to_chat_text());
                    Ok(())
                }
            }
        }
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    init_tracing("info")?;

    let token = config.token()?;
    let api = Arc::new(BotApi::new(config.telegram.api_url.clone(), token));
    let quotes = Arc::new(ArchiveClient::new(config.archive.base_url.clone()));
    let store = Arc::new(SessionStore::open(&config.session.db_path)?);

    let me = api.get_me().await?;
    info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        "connected"
    );

    let chat_api: Arc<dyn ChatApi> = Arc::clone(&api);
    let bot = Bot::new(chat_api, quotes, store, &config.pool)?;

    let result = if let Some(webhook) = &config.webhook {
        let token = config.token()?;
        let public_url = format!(
            "{}/{}",
            webhook.public_url.trim_end_matches('/'),
            token.expose_secret()
        );
        api.set_webhook(&public_url, config.pool.size, webhook.certificate.as_deref())
            .await?;
        info!("webhook set");

        tokio::select! {
            res = bot::serve_webhook(Arc::clone(&bot), &webhook.bind, token.expose_secret()) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    } else {
        // A stale webhook registration blocks getUpdates.
        api.delete_webhook().await.ok();

        tokio::select! {
            res = bot::run_polling(
                Arc::clone(&bot),
                Arc::clone(&api),
                config.pool.size,
                config.telegram.poll_timeout_s,
            ) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    };

    info!("shutting down, draining in-flight updates");
    bot.stop().await;

    result?;
    Ok(())
}

fn cmd_session_list(store: &SessionStore) -> anyhow::Result<()> {
    let sessions = store.list_sessions()?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!(
        "{:<12}  {:<22}  {:<12}  UPDATED",
        "CHAT", "STATE", "LAST QUOTE"
    );
    println!("{}", "-".repeat(64));
    for session in &sessions {
        println!(
            "{:<12}  {:<22}  {:<12}  {}",
            session.chat_id,
            session.state,
            session.last_quote.as_deref().unwrap_or("-"),
            session.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} session(s)", sessions.len());
    Ok(())
}

fn cmd_session_show(store: &SessionStore, chat_id: i64) -> anyhow::Result<()> {
    println!("Chat:       {chat_id}");
    match store.state(chat_id)? {
        Some(state) => println!("State:      {state}"),
        None => println!("State:      - (never seen)"),
    }
    println!(
        "Last quote: {}",
        store.last_quote(chat_id)?.as_deref().unwrap_or("-")
    );

    if let Some(search) = store.search(chat_id)? {
        println!(
            "Search:     {:?} at position {}",
            search.query, search.position
        );
    }

    let saved = store.saved_quotes(chat_id)?;
    if saved.is_empty() {
        println!("Saved:      -");
    } else {
        println!("Saved:      {}", saved.join(", "));
    }

    Ok(())
}

fn print_quotes(quotes: Vec<Quote>) -> anyhow::Result<()> {
    for quote in &quotes {
        println!("{}", quote.to_chat_text());
    }
    println!("{} quote(s)", quotes.len());
    Ok(())
}
