//! Client-side services used by the pages.
//!
//! ARCHITECTURE
//! ============
//! Service modules own session and chat state so pages stay focused on
//! terminal input and rendering.

pub mod chat;
pub mod session;
pub mod token_store;

#[cfg(test)]
pub mod test_helpers;
