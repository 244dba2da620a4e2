//! fedauth: sign in to any Mastodon-compatible instance.
//!
//! The application registers itself with whichever instance the user names,
//! walks the user through the OAuth authorization-code flow, and keeps the
//! resulting credential and profile on disk for later sessions.
//!
//! # Quick Start
//!
//! ```no_run
//! use fedauth::prelude::*;
//!
//! # async fn example() -> fedauth::error::Result<()> {
//! let service = AuthService::from_config(ClientConfig::from_env()?)?;
//! let step = service.sign_in("mastodon.social", "@alice").await?;
//! println!("open {}", step.authorize_url);
//!
//! // ...after the instance redirects back with ?code=...&state=...
//! let params = parse_callback_url("http://localhost:3000/api/auth/callback?code=c&state=s")?;
//! service
//!     .complete_sign_in(&step.session_key, params.code.as_deref(), params.state.as_deref())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
