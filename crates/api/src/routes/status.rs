use crate::descriptor::{handler_fn, AllowAll, RouteDefinition};
use crate::request::Reply;
use crate::Verb;

#[derive(serde::Serialize)]
struct Status {
    success: bool,
    version: &'static str,
}

pub fn definition() -> RouteDefinition {
    RouteDefinition::new()
        .verb(Verb::Get)
        .path("/status")
        .template("status")
        .local("title", "Service status")
        .authorization(AllowAll)
        .handler(handler_fn(|_req, _res| {
            Reply::payload(Status {
                success: true,
                version: env!("CARGO_PKG_VERSION"),
            })
        }))
}
