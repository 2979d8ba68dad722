//! Authentication module for OAuth2 and credential management
//!
//! This module provides:
//! - The bundled application credentials and confirmation page
//! - The on-disk token cache
//! - The local redirect listener
//! - The interactive authorization-code flow (with PKCE)
//! - Session resolution on top of the cache and the flow

mod pkce;
mod secret;
mod token_store;
mod callback_server;
mod provider;
mod flow;
mod session;

pub use secret::{ApplicationSecret, RESPONSE_HTML};
pub use token_store::{CachedToken, TokenStore};
pub use callback_server::{AuthorizationCallback, CallbackServer, PendingCallback};
pub use provider::{OAuthClient, TokenExchanger};
pub use flow::{AuthorizationFlow, AuthorizationRequest, FlowState};
pub use session::{Authenticator, ResolvedSession, Session, SessionSource};
