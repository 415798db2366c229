use async_trait::async_trait;
use serde_json::Value;
use triage_core::error::RouteError;

use crate::descriptor::{handler_fn, Authorize, RouteDefinition};
use crate::request::{Reply, RouteRequest};
use crate::Verb;

/// Session key holding the signed-in user.
pub const SESSION_USER_KEY: &str = "user";

/// Passes only when the session carries a user.
pub struct SessionUser;

#[async_trait]
impl Authorize for SessionUser {
    async fn authorize(&self, req: &RouteRequest) -> Result<(), RouteError> {
        match req.session().and_then(|s| s.get(SESSION_USER_KEY)) {
            Some(user) if !user.is_null() => Ok(()),
            _ => Err(RouteError::unauthorized("not authorized")),
        }
    }
}

pub fn definition() -> RouteDefinition {
    RouteDefinition::new()
        .verb(Verb::Get)
        .path("/account")
        .template("account")
        .authorization(SessionUser)
        .handler(handler_fn(|req, _res| {
            let user = req
                .session()
                .and_then(|s| s.get(SESSION_USER_KEY))
                .unwrap_or(Value::Null);
            Reply::payload(serde_json::json!({ "user": user }))
        }))
}
