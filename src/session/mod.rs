//! Client-side session handling.
//!
//! A [`SessionManager`] owns the stored token pair and writes every change
//! through to a [`SessionStorage`] backend. A [`SessionClient`] attaches the
//! access token to outgoing requests and, when the server answers 401, trades
//! the refresh token for a new pair and resubmits the request once:
//!
//! ```text
//! send ──► 401 ──► refresh exchange ──► rotate pair ──► resend ──► done
//!            │            │                               │
//!            │            └─ fails ─► clear + reauth      └─ 401 ─► clear + reauth
//!            └─ no refresh token ─► clear + reauth
//! ```
//!
//! The one-shot marker lives on the [`ApiRequest`] itself, so concurrent
//! requests never share retry state. Concurrent 401s funnel through a single
//! refresh gate and reuse whichever pair landed first.

mod client;
mod error;
mod request;
mod store;

pub use client::{
    DEFAULT_TIMEOUT, LoginHandle, NoopReauth, ProfileImage, ReauthHandler, RegisterForm,
    SessionClient,
};
pub use error::SessionError;
pub use request::{ApiRequest, FormField, RequestBody};
pub use store::{FileStorage, MemoryStorage, SessionManager, SessionState, SessionStorage, StorageError};
