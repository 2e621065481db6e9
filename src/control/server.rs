// src/control/server.rs

//! HTTP front of the control surface.
//!
//! tiny_http accepts connections on a dedicated thread; every request is
//! handled on its own thread because `/events` streams block for as long as
//! the viewer stays connected. Async control operations are driven through
//! the Tokio runtime handle captured at startup.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::json;
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::routes::{route, Route};
use super::sse::serve_events;
use super::surface::ControlSurface;
use crate::supervisor::ExecuteError;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

mod mime {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
}

/// Bound HTTP server, not yet accepting requests.
pub struct ControlServer {
    server: Arc<Server>,
    addr: SocketAddr,
}

impl ControlServer {
    pub fn bind(addr: &str) -> Result<Self> {
        let server = Server::http(addr).map_err(|e| anyhow!("binding control server on {addr}: {e}"))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow!("control server is not bound to an IP address"))?;
        Ok(Self {
            server: Arc::new(server),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start accepting requests on a background thread.
    pub fn start(
        self,
        surface: ControlSurface,
        keep_alive: Duration,
        runtime: Handle,
    ) -> Result<ServerHandle> {
        let server = Arc::clone(&self.server);
        let join = thread::Builder::new()
            .name("simwatch-http".into())
            .spawn(move || accept_loop(&server, surface, keep_alive, runtime))?;
        info!(addr = %self.addr, "control server listening");
        Ok(ServerHandle {
            server: self.server,
            addr: self.addr,
            join: Some(join),
        })
    }
}

/// Running server. `shutdown` (or drop) stops accepting connections;
/// open event streams end when the broadcaster goes away.
pub struct ServerHandle {
    server: Arc<Server>,
    addr: SocketAddr,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.server.unblock();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(server: &Server, surface: ControlSurface, keep_alive: Duration, runtime: Handle) {
    for request in server.incoming_requests() {
        let surface = surface.clone();
        let runtime = runtime.clone();
        let spawned = thread::Builder::new()
            .name("simwatch-request".into())
            .spawn(move || {
                if let Err(e) = handle_request(request, &surface, keep_alive, &runtime) {
                    debug!(error = %e, "request error");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not spawn request thread");
        }
    }
    debug!("control server accept loop finished");
}

fn handle_request(
    request: Request,
    surface: &ControlSurface,
    keep_alive: Duration,
    runtime: &Handle,
) -> Result<()> {
    let route = route(request.method(), request.url());
    debug!(method = %request.method(), url = request.url(), ?route, "control request");

    match route {
        Route::Index => send(request, 200, mime::HTML, INDEX_HTML.to_string()),
        Route::Events => {
            serve_events(request, surface.subscribe(), keep_alive);
            Ok(())
        }
        Route::Restart => match runtime.block_on(surface.restart()) {
            Ok(()) => send_json(request, 200, &json!({ "status": "restarting" })),
            Err(e) => send_json(request, 503, &json!({ "error": e.to_string() })),
        },
        Route::Stop => match runtime.block_on(surface.stop()) {
            Ok(_) => send_json(request, 200, &json!({ "status": "stopped" })),
            Err(e) => send_json(request, 503, &json!({ "error": e.to_string() })),
        },
        Route::Status => send_json(request, 200, &surface.status()),
        Route::CompiledFiles => send_json(request, 200, &surface.compiled_files()),
        Route::Execute => match runtime.block_on(surface.execute()) {
            Ok(report) if report.success() => send_json(request, 200, &report),
            Ok(report) => {
                let code = report.code.map_or("signal".to_string(), |c| c.to_string());
                send_json(
                    request,
                    500,
                    &json!({
                        "code": report.code,
                        "stdout": report.stdout,
                        "stderr": report.stderr,
                        "error": format!("runtime exited with {code}"),
                    }),
                )
            }
            Err(e @ ExecuteError::NoArtifacts) => {
                send_json(request, 409, &json!({ "error": e.to_string() }))
            }
            Err(e) => send_json(
                request,
                500,
                &json!({ "code": null, "stdout": "", "stderr": "", "error": e.to_string() }),
            ),
        },
        Route::NotFound => send(request, 404, mime::PLAIN, "not found".to_string()),
        Route::MethodNotAllowed => {
            send(request, 405, mime::PLAIN, "method not allowed".to_string())
        }
    }
}

fn send_json<T: Serialize + ?Sized>(request: Request, status: u16, body: &T) -> Result<()> {
    let body = serde_json::to_string(body)?;
    send(request, status, mime::JSON, body)
}

fn send(request: Request, status: u16, content_type: &'static str, body: String) -> Result<()> {
    let response = with_content_type(
        Response::from_string(body).with_status_code(StatusCode(status)),
        content_type,
    );
    request.respond(response)?;
    Ok(())
}

fn with_content_type<R: Read>(response: Response<R>, value: &'static str) -> Response<R> {
    match Header::from_bytes("Content-Type", value) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
