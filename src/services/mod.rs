//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation and cookie plumbing.
//! Leaf-first: `session` → `identity` → `chat` → `bus` → `connection`.

pub mod bus;
pub mod chat;
pub mod connection;
pub mod identity;
pub mod search;
pub mod session;
pub mod weather;
