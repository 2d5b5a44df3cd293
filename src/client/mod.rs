//! Calling side of the session protocol.

mod coordinator;
mod error;
mod http;

pub use coordinator::{Phase, Refresher, SessionCoordinator};
pub use error::{AuthFailure, ClientError};
pub use http::{AuthClient, HttpRefresher};
