//! Integration tests for the session store.

use quotebot::session::{SessionState, SessionStore};

fn test_store() -> SessionStore {
    SessionStore::in_memory().expect("failed to create in-memory store")
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[test]
fn unknown_chat_has_no_state() {
    let store = test_store();
    assert_eq!(store.state(1).unwrap(), None);
}

#[test]
fn state_round_trips() {
    let store = test_store();
    store.set_state(1, SessionState::ShowingRandom).unwrap();
    assert_eq!(store.state(1).unwrap(), Some(SessionState::ShowingRandom));

    store.set_state(1, SessionState::AwaitingSearchTerm).unwrap();
    assert_eq!(
        store.state(1).unwrap(),
        Some(SessionState::AwaitingSearchTerm)
    );
}

#[test]
fn chats_do_not_share_state() {
    let store = test_store();
    store.set_state(1, SessionState::ShowingSaved).unwrap();
    store.set_state(2, SessionState::Menu).unwrap();

    assert_eq!(store.state(1).unwrap(), Some(SessionState::ShowingSaved));
    assert_eq!(store.state(2).unwrap(), Some(SessionState::Menu));
}

// ---------------------------------------------------------------------------
// Last quote
// ---------------------------------------------------------------------------

#[test]
fn last_quote_round_trips() {
    let store = test_store();
    assert_eq!(store.last_quote(1).unwrap(), None);

    store.set_last_quote(1, "440245").unwrap();
    assert_eq!(store.last_quote(1).unwrap(), Some("440245".to_string()));

    store.set_last_quote(1, "7").unwrap();
    assert_eq!(store.last_quote(1).unwrap(), Some("7".to_string()));
}

#[test]
fn setting_last_quote_first_defaults_the_state() {
    let store = test_store();
    store.set_last_quote(5, "42").unwrap();
    // The implicit session row starts at the menu.
    assert_eq!(store.state(5).unwrap(), Some(SessionState::Menu));
}

// ---------------------------------------------------------------------------
// Saved quotes
// ---------------------------------------------------------------------------

#[test]
fn saving_twice_keeps_one_copy() {
    let store = test_store();
    store.save_quote(1, "100").unwrap();
    store.save_quote(1, "100").unwrap();
    store.save_quote(1, "200").unwrap();

    assert_eq!(store.saved_quotes(1).unwrap().len(), 2);
}

#[test]
fn delete_reports_whether_the_quote_was_saved() {
    let store = test_store();
    store.save_quote(1, "100").unwrap();

    assert!(store.delete_saved_quote(1, "100").unwrap());
    assert!(!store.delete_saved_quote(1, "100").unwrap());
    assert!(store.saved_quotes(1).unwrap().is_empty());
}

#[test]
fn saved_quotes_are_per_chat() {
    let store = test_store();
    store.save_quote(1, "100").unwrap();
    store.save_quote(2, "200").unwrap();

    assert_eq!(store.saved_quotes(1).unwrap(), vec!["100".to_string()]);
    assert_eq!(store.saved_quotes(2).unwrap(), vec!["200".to_string()]);
}

// ---------------------------------------------------------------------------
// Search progress
// ---------------------------------------------------------------------------

#[test]
fn search_progress_round_trips() {
    let store = test_store();
    assert_eq!(store.search(9).unwrap(), None);

    store.set_search(9, "deploy friday", 0, None).unwrap();
    store.set_search(9, "deploy friday", 3, Some("42")).unwrap();

    let progress = store.search(9).unwrap().unwrap();
    assert_eq!(progress.query, "deploy friday");
    assert_eq!(progress.position, 3);
    assert_eq!(progress.quote_id.as_deref(), Some("42"));
}

// ---------------------------------------------------------------------------
// Resets
// ---------------------------------------------------------------------------

#[test]
fn reset_chat_clears_transient_state_but_keeps_saved() {
    let store = test_store();
    store.set_state(1, SessionState::ShowingSearchResult).unwrap();
    store.set_last_quote(1, "42").unwrap();
    store.set_search(1, "deploy", 2, Some("42")).unwrap();
    store.save_quote(1, "42").unwrap();

    store.reset_chat(1).unwrap();

    assert_eq!(store.state(1).unwrap(), Some(SessionState::Menu));
    assert_eq!(store.last_quote(1).unwrap(), None);
    assert_eq!(store.search(1).unwrap(), None);
    assert_eq!(store.saved_quotes(1).unwrap(), vec!["42".to_string()]);
}

#[test]
fn reset_transient_sweeps_every_chat() {
    let store = test_store();
    store.set_state(1, SessionState::ShowingRandom).unwrap();
    store.set_state(2, SessionState::AwaitingSearchTerm).unwrap();
    store.set_search(2, "x", 1, None).unwrap();
    store.save_quote(2, "9").unwrap();

    store.reset_transient().unwrap();

    assert_eq!(store.state(1).unwrap(), None);
    assert_eq!(store.state(2).unwrap(), None);
    assert_eq!(store.search(2).unwrap(), None);
    assert_eq!(store.saved_quotes(2).unwrap(), vec!["9".to_string()]);
}

#[test]
fn delete_chat_forgets_everything_about_it() {
    let store = test_store();
    store.set_state(1, SessionState::ShowingSaved).unwrap();
    store.save_quote(1, "9").unwrap();
    store.set_search(1, "x", 1, None).unwrap();
    store.set_state(2, SessionState::Menu).unwrap();

    store.delete_chat(1).unwrap();

    assert_eq!(store.state(1).unwrap(), None);
    assert!(store.saved_quotes(1).unwrap().is_empty());
    assert_eq!(store.search(1).unwrap(), None);
    // The other chat is untouched.
    assert_eq!(store.state(2).unwrap(), Some(SessionState::Menu));
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[test]
fn list_sessions_shows_every_known_chat() {
    let store = test_store();
    store.set_state(1, SessionState::Menu).unwrap();
    store.set_last_quote(2, "42").unwrap();

    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 2);

    let chat_ids: Vec<i64> = sessions.iter().map(|s| s.chat_id).collect();
    assert!(chat_ids.contains(&1));
    assert!(chat_ids.contains(&2));

    let second = sessions.iter().find(|s| s.chat_id == 2).unwrap();
    assert_eq!(second.last_quote.as_deref(), Some("42"));
}
