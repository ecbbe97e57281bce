use super::*;
use crate::services::test_helpers::{MemoryTokenStore, MockAuth};
use std::sync::Arc;

#[test]
fn paths_match_client_routes() {
    assert_eq!(Route::Login.path(), "/login");
    assert_eq!(Route::Chat.path(), "/chat");
}

#[test]
fn guard_redirects_chat_without_session() {
    assert_eq!(guard(Route::Chat, false), Route::Login);
    assert_eq!(guard(Route::Chat, true), Route::Chat);
    assert_eq!(guard(Route::Login, false), Route::Login);
    assert_eq!(guard(Route::Login, true), Route::Login);
}

#[test]
fn initial_route_follows_restored_session() {
    let auth = Arc::new(MockAuth::default());
    let restored = SessionManager::new(Some(auth.clone()), Arc::new(MemoryTokenStore::with("alice", "r:alice")));
    let fresh = SessionManager::new(Some(auth), Arc::new(MemoryTokenStore::default()));

    assert_eq!(initial(&restored), Route::Chat);
    assert_eq!(initial(&fresh), Route::Login);
}

#[tokio::test]
async fn resolve_tracks_login_and_logout() {
    let session = SessionManager::new(Some(Arc::new(MockAuth::default())), Arc::new(MemoryTokenStore::default()));
    assert_eq!(resolve(Route::Chat, &session), Route::Login);

    session.login("alice", "pw").await.unwrap();
    assert_eq!(resolve(Route::Chat, &session), Route::Chat);

    session.logout().await.unwrap();
    assert_eq!(resolve(Route::Chat, &session), Route::Login);
}
