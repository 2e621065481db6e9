// src/control/routes.rs

use tiny_http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Events,
    Restart,
    Stop,
    Status,
    CompiledFiles,
    Execute,
    NotFound,
    MethodNotAllowed,
}

/// Map a request line onto a control route. Query strings are ignored.
/// Action endpoints accept GET and POST; read endpoints GET only.
pub fn route(method: &Method, url: &str) -> Route {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };

    let (route, action) = match path {
        "/" | "/index.html" => (Route::Index, false),
        "/events" => (Route::Events, false),
        "/status" => (Route::Status, false),
        "/compiled-files" => (Route::CompiledFiles, false),
        "/restart" => (Route::Restart, true),
        "/stop" => (Route::Stop, true),
        "/execute" => (Route::Execute, true),
        _ => return Route::NotFound,
    };

    let allowed = match method {
        Method::Get => true,
        Method::Post => action,
        _ => false,
    };
    if allowed { route } else { Route::MethodNotAllowed }
}
