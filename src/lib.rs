//! Desktop client for the Virtual-G companion chat service.
//!
//! Everything except [`ui`] is toolkit independent and builds without GTK;
//! enable the `gui` feature for the windows.

pub mod api;
pub mod app;
pub mod error;
pub mod markup;
pub mod state;
pub mod storage;
pub mod utils;
pub mod voice;

#[cfg(feature = "gui")]
pub mod ui;

pub use api::client::ApiClient;
pub use error::{ApiError, Result};
