//! HTTP middleware and extractors.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, added by the binary)
//! 2. CORS (browser clients on other origins)
//! 3. `TraceLayer` (request span)
//! 4. Request ID (recorded on the span, echoed on the response)
//!
//! Extractors: [`Tab`] opens the caller's cart container, [`RequireBearer`]
//! takes the token forwarded on admin calls.

pub mod auth;
pub mod request_id;
pub mod tab;

pub use auth::RequireBearer;
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
pub use tab::{DEVICE_ID_HEADER, TAB_ID_HEADER, Tab, USER_ID_HEADER};
