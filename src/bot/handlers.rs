//! Conversation handlers: menu, random, search, and saved-quotes flows.

use tracing::warn;

use super::Bot;
use crate::error::Result;
use crate::quotes::Vote;
use crate::session::SessionState;
use crate::telegram::types::ReplyMarkup;

pub const CMD_START: &str = "/start";

// Button labels. These double as the protocol: a chat's reply is matched
// against them verbatim.
pub const BTN_RANDOM: &str = "Random";
pub const BTN_SEARCH: &str = "Search";
pub const BTN_SAVED: &str = "Saved";
pub const BTN_MORE: &str = "Another one";
pub const BTN_UP: &str = "➕";
pub const BTN_DOWN: &str = "➖";
pub const BTN_OLD: &str = "[ : ||| : ]";
pub const BTN_BACK: &str = "Back";
pub const BTN_DELETE: &str = "Delete";

pub const MSG_WHAT_NEXT: &str = "What should I send?";
pub const MSG_BAD_INPUT: &str = "Didn't catch that, use the buttons.";
pub const MSG_NOTHING: &str = "Nothing to show :(";
pub const MSG_SEARCH_PROMPT: &str = "What are we looking for?";
pub const MSG_ERROR: &str = "Something broke on our side :(";

fn menu_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(&[&[BTN_RANDOM], &[BTN_SEARCH], &[BTN_SAVED]])
}

fn feedback_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(&[&[BTN_MORE], &[BTN_UP, BTN_DOWN, BTN_OLD], &[BTN_BACK]])
}

fn saved_keyboard() -> ReplyMarkup {
    ReplyMarkup::keyboard(&[&[BTN_MORE], &[BTN_DELETE], &[BTN_BACK]])
}

fn vote_for(text: &str) -> Option<Vote> {
    match text {
        BTN_UP => Some(Vote::Up),
        BTN_DOWN => Some(Vote::Down),
        BTN_OLD => Some(Vote::Old),
        _ => None,
    }
}

fn pick_random<T>(items: &[T]) -> Option<&T> {
    use rand::seq::SliceRandom;
    items.choose(&mut rand::thread_rng())
}

impl Bot {
    pub(super) async fn handle_menu(&self, chat_id: i64, text: &str) -> Result<()> {
        match text {
            CMD_START => self.show_menu(chat_id, MSG_WHAT_NEXT).await,
            BTN_RANDOM => self.send_random(chat_id).await,
            BTN_SEARCH => self.prompt_search(chat_id).await,
            BTN_SAVED => self.send_saved(chat_id).await,
            _ => self.show_menu(chat_id, MSG_BAD_INPUT).await,
        }
    }

    /// Put the chat back at the menu: transient state cleared, choices shown.
    pub(super) async fn show_menu(&self, chat_id: i64, text: &str) -> Result<()> {
        self.store.reset_chat(chat_id)?;
        self.api
            .send_text(chat_id, text, Some(menu_keyboard()))
            .await?;
        Ok(())
    }

    /// Apology path for failed handlers; lands the chat somewhere usable.
    pub(super) async fn apologize(&self, chat_id: i64) -> Result<()> {
        self.show_menu(chat_id, MSG_ERROR).await
    }

    // -----------------------------------------------------------------------
    // Random quotes
    // -----------------------------------------------------------------------

    async fn send_random(&self, chat_id: i64) -> Result<()> {
        let quotes = self.quotes.random().await?;
        let Some(quote) = pick_random(&quotes) else {
            return self.show_menu(chat_id, MSG_NOTHING).await;
        };

        self.api
            .send_text(chat_id, &quote.to_chat_text(), Some(feedback_keyboard()))
            .await?;

        self.store.set_state(chat_id, SessionState::ShowingRandom)?;
        self.store.set_last_quote(chat_id, &quote.id)?;
        Ok(())
    }

    pub(super) async fn handle_random_feedback(&self, chat_id: i64, text: &str) -> Result<()> {
        match text {
            BTN_MORE => self.send_random(chat_id).await,
            BTN_UP | BTN_DOWN | BTN_OLD => {
                if let Some(quote_id) = self.store.last_quote(chat_id)? {
                    // Voting up is also how a quote gets saved.
                    if text == BTN_UP {
                        self.store.save_quote(chat_id, &quote_id)?;
                    }
                    if let Some(vote) = vote_for(text) {
                        self.vote_in_background(quote_id, vote);
                    }
                }
                self.send_random(chat_id).await
            }
            BTN_BACK => self.show_menu(chat_id, MSG_WHAT_NEXT).await,
            _ => self.show_menu(chat_id, MSG_BAD_INPUT).await,
        }
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    async fn prompt_search(&self, chat_id: i64) -> Result<()> {
        self.store
            .set_state(chat_id, SessionState::AwaitingSearchTerm)?;
        self.api
            .send_text(
                chat_id,
                MSG_SEARCH_PROMPT,
                Some(ReplyMarkup::remove_keyboard()),
            )
            .await?;
        Ok(())
    }

    pub(super) async fn handle_search_term(&self, chat_id: i64, text: &str) -> Result<()> {
        let query = text.trim();
        if query.is_empty() {
            return self.show_menu(chat_id, MSG_BAD_INPUT).await;
        }

        self.store.set_search(chat_id, query, 0, None)?;
        self.store
            .set_state(chat_id, SessionState::ShowingSearchResult)?;
        self.send_found(chat_id, query, 0).await
    }

    /// Show the search result at `position` and advance the cursor.
    async fn send_found(&self, chat_id: i64, query: &str, position: u32) -> Result<()> {
        let quotes = self.quotes.search(query).await?;
        let Some(quote) = quotes.get(position as usize) else {
            return self.show_menu(chat_id, MSG_NOTHING).await;
        };

        self.api
            .send_text(chat_id, &quote.to_chat_text(), Some(feedback_keyboard()))
            .await?;

        self.store
            .set_search(chat_id, query, position + 1, Some(&quote.id))?;
        Ok(())
    }

    pub(super) async fn handle_search_feedback(&self, chat_id: i64, text: &str) -> Result<()> {
        let Some(progress) = self.store.search(chat_id)? else {
            return self.show_menu(chat_id, MSG_WHAT_NEXT).await;
        };

        match text {
            BTN_MORE => {
                self.send_found(chat_id, &progress.query, progress.position)
                    .await
            }
            BTN_UP | BTN_DOWN | BTN_OLD => {
                if let (Some(quote_id), Some(vote)) = (progress.quote_id.clone(), vote_for(text)) {
                    self.vote_in_background(quote_id, vote);
                }
                self.send_found(chat_id, &progress.query, progress.position)
                    .await
            }
            BTN_BACK => self.show_menu(chat_id, MSG_WHAT_NEXT).await,
            _ => self.show_menu(chat_id, MSG_BAD_INPUT).await,
        }
    }

    // -----------------------------------------------------------------------
    // Saved quotes
    // -----------------------------------------------------------------------

    async fn send_saved(&self, chat_id: i64) -> Result<()> {
        let saved = self.store.saved_quotes(chat_id)?;
        let Some(quote_id) = pick_random(&saved) else {
            return self.show_menu(chat_id, MSG_NOTHING).await;
        };

        let quote = self.quotes.by_id(quote_id).await?;

        self.api
            .send_text(chat_id, &quote.to_chat_text(), Some(saved_keyboard()))
            .await?;

        self.store.set_last_quote(chat_id, &quote.id)?;
        self.store.set_state(chat_id, SessionState::ShowingSaved)?;
        Ok(())
    }

    pub(super) async fn handle_saved_feedback(&self, chat_id: i64, text: &str) -> Result<()> {
        match text {
            BTN_MORE => self.send_saved(chat_id).await,
            BTN_DELETE => {
                if let Some(quote_id) = self.store.last_quote(chat_id)? {
                    self.store.delete_saved_quote(chat_id, &quote_id)?;
                }
                self.send_saved(chat_id).await
            }
            BTN_BACK => self.show_menu(chat_id, MSG_WHAT_NEXT).await,
            _ => self.show_menu(chat_id, MSG_BAD_INPUT).await,
        }
    }

    /// Fire-and-forget archive vote; failures are logged, never surfaced.
    fn vote_in_background(&self, quote_id: String, vote: Vote) {
        let quotes = std::sync::Arc::clone(&self.quotes);
        tokio::spawn(async move {
            if let Err(e) = quotes.vote(&quote_id, vote).await {
                warn!(quote_id = %quote_id, "vote failed: {e}");
            }
        });
    }
}
