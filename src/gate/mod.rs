//! Request gate
//!
//! Every page and auth API request passes through [`gate_request`], which
//! decides from the route and the session cookie whether to forward the
//! request, redirect it to login/onboarding/dashboard, or clear a stale
//! session cookie on the way.

mod middleware;
mod routes;

pub use middleware::{
    Decision, SessionState, USER_AUTHENTICATED_HEADER, USER_ID_HEADER, decide, gate_request,
};
pub use routes::{Route, RouteClass};
