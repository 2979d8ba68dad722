//! SaferViewer - drop a file, get its Google Drive view
//!
//! This library provides the OAuth2 authorization-code flow with a cached
//! token, the Drive upload and the glue that opens the uploaded file.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod opener;
pub mod storage;
pub mod transfer;
pub mod ui;

pub use error::{Error, Result};
