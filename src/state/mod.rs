//! Toolkit-independent view state. The GTK widgets in `ui` render these and
//! forward user actions to them.

pub mod auth;
pub mod chat;
pub mod payment;
pub mod sessions;
pub mod voice;
