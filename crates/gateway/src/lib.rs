#![forbid(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod http;
pub mod repository;

pub use auth::{AuthContext, StaticToken};
pub use cache::{InMemoryResultCache, ResultCache};
pub use http::{HttpGateway, HttpGatewayConfig};
pub use repository::{
    FailureClass, GatewayError, InMemoryGateway, SessionGateway, StartedSession, SubmitGate,
};
