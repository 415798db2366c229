pub mod account;
pub mod echo;
pub mod greeting;
pub mod health;
pub mod status;

use crate::loader::ModuleCatalog;

/// Route modules bundled with the binary.
///
/// Route names double as configuration keys:
///
/// ```text
/// GET-status       GET  /status            template "status", static locals
/// POST-echo        POST /echo              rule-validated JSON body, CORS
/// GET-greeting     GET  /greeting/{name}   factory, reads `greeting` from config
/// GET-account      GET  /account           requires a signed-in session user
/// ```
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .with_static("GET-status", status::definition())
        .with_static("POST-echo", echo::definition())
        .with_factory("GET-greeting", greeting::definition)
        .with_static("GET-account", account::definition())
}
