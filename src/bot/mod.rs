//! Session router and update intake.
//!
//! Every inbound update is wrapped as a task and pushed through the worker
//! pool with a timed submission, so a flood of updates degrades into dropped
//! ones instead of unbounded pile-up. The handler for an update is chosen by
//! the chat's recorded session state; a chat nobody has seen yet starts at
//! the menu.

mod handlers;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::quotes::QuoteSource;
use crate::session::{SessionState, SessionStore};
use crate::telegram::types::Update;
use crate::telegram::{BotApi, ChatApi};

pub use handlers::{
    BTN_BACK, BTN_DELETE, BTN_DOWN, BTN_MORE, BTN_OLD, BTN_RANDOM, BTN_SAVED, BTN_SEARCH, BTN_UP,
    CMD_START, MSG_BAD_INPUT, MSG_ERROR, MSG_NOTHING, MSG_SEARCH_PROMPT, MSG_WHAT_NEXT,
};

/// The bot: transport, quote source, session store, and the pool that
/// bounds how many updates are in flight at once.
pub struct Bot {
    api: Arc<dyn ChatApi>,
    quotes: Arc<dyn QuoteSource>,
    store: Arc<SessionStore>,
    pool: Pool<Result<()>>,
    submit_timeout: Duration,
    /// One async lock per chat: updates for the same chat run in sequence,
    /// so a handler's session read-modify-write never interleaves with
    /// another update's. Entries are a few words each and never evicted.
    chat_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Bot {
    /// Build the bot and start its worker pool.
    ///
    /// Transient session state left over from a previous process is cleared
    /// so stale modes never route a message to the wrong handler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        api: Arc<dyn ChatApi>,
        quotes: Arc<dyn QuoteSource>,
        store: Arc<SessionStore>,
        pool_config: &PoolConfig,
    ) -> Result<Arc<Self>> {
        let pool = Pool::new(pool_config.size)?;
        pool.run();

        store.reset_transient()?;

        Ok(Arc::new(Self {
            api,
            quotes,
            store,
            pool,
            submit_timeout: pool_config.submit_timeout(),
            chat_locks: Mutex::new(HashMap::new()),
        }))
    }

    /// Drain in-flight updates and stop the workers.
    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Route one update through the pool.
    ///
    /// Never fails upward: an admission timeout means the update was dropped
    /// unprocessed (no side effects happened), a handler error was already
    /// answered with an apology. Both are logged and swallowed here.
    pub async fn handle_update(self: Arc<Self>, update: Update) {
        let update_id = update.update_id;
        let bot = Arc::clone(&self);
        let task = async move { bot.process(update).await };

        match self.pool.submit_timed(task, self.submit_timeout).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(update_id, "update not handled: {e}"),
            Err(e) => warn!(update_id, "update dropped: {e}"),
        }
    }

    /// Resolve the chat's state and dispatch to the matching handler.
    async fn process(&self, update: Update) -> Result<()> {
        let message = update.message.ok_or(Error::NoMessage)?;
        let chat_id = message.chat.id;
        let text = message.text.unwrap_or_default();

        let lock = self.chat_lock(chat_id);
        let _guard = lock.lock().await;

        let state = match self.store.state(chat_id) {
            Ok(Some(state)) => state,
            Ok(None) => SessionState::Menu,
            Err(e) => {
                warn!(chat_id, "state lookup failed, falling back to menu: {e}");
                SessionState::Menu
            }
        };

        debug!(chat_id, %state, text = %text, "dispatching");

        let outcome = match state {
            SessionState::Menu => self.handle_menu(chat_id, &text).await,
            SessionState::AwaitingSearchTerm => self.handle_search_term(chat_id, &text).await,
            SessionState::ShowingRandom => self.handle_random_feedback(chat_id, &text).await,
            SessionState::ShowingSearchResult => self.handle_search_feedback(chat_id, &text).await,
            SessionState::ShowingSaved => self.handle_saved_feedback(chat_id, &text).await,
        };

        if let Err(e) = outcome {
            error!(chat_id, %state, "handler error: {e}");
            if let Err(e) = self.apologize(chat_id).await {
                error!(chat_id, "could not deliver error notice: {e}");
            }
        }

        Ok(())
    }

    fn chat_lock(&self, chat_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.chat_locks
                .lock()
                .expect("chat lock map poisoned")
                .entry(chat_id)
                .or_default(),
        )
    }
}

/// Long-poll intake: fetch updates, advance the offset, hand each one to the
/// router without waiting for it, since a slow handler must never stall the loop.
pub async fn run_polling(
    bot: Arc<Bot>,
    api: Arc<BotApi>,
    batch: usize,
    poll_timeout_s: u64,
) -> Result<()> {
    let mut offset: Option<i64> = None;
    info!("polling for updates");

    loop {
        let updates = match api.get_updates(offset, batch, poll_timeout_s).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("getUpdates failed: {e}");
                tokio::time::sleep(Duration::from_secs(3)).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            let bot = Arc::clone(&bot);
            tokio::spawn(async move { bot.handle_update(update).await });
        }
    }
}

/// Webhook intake: the platform POSTs updates to the bot-token path. The
/// token is matched as a path parameter because bot tokens contain `:`,
/// which the route grammar reserves.
pub fn webhook_router(bot: Arc<Bot>, token_path: &str) -> Router {
    let state = WebhookState {
        bot,
        token: Arc::from(token_path),
    };
    Router::new()
        .route("/:token", post(receive_update))
        .with_state(state)
}

#[derive(Clone)]
struct WebhookState {
    bot: Arc<Bot>,
    token: Arc<str>,
}

async fn receive_update(
    State(state): State<WebhookState>,
    Path(token): Path<String>,
    Json(update): Json<Update>,
) -> StatusCode {
    if token != *state.token {
        return StatusCode::NOT_FOUND;
    }
    state.bot.handle_update(update).await;
    StatusCode::OK
}

/// Bind and serve the webhook router until the process is told to stop.
pub async fn serve_webhook(bot: Arc<Bot>, bind: &str, token_path: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = bind, "webhook listening");
    axum::serve(listener, webhook_router(bot, token_path)).await?;
    Ok(())
}
