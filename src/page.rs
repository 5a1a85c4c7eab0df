//! HTTP responder serving the "blocked" page to sinkholed clients.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::BindError;
use crate::state::ServerState;

pub const LOGO_FILE: &str = "logo.png";
pub const UNKNOWN_DOMAIN: &str = "Unknown";
pub const NO_REASON: &str = "No reason provided.";

#[derive(Clone)]
struct PageState {
    state: Arc<ServerState>,
    logo: Arc<PathBuf>,
}

/// Routes: the logo and favicon assets, and the block page for every other path.
pub fn router(state: Arc<ServerState>, static_dir: impl AsRef<Path>) -> Router {
    let page = PageState {
        state,
        logo: Arc::new(static_dir.as_ref().join(LOGO_FILE)),
    };
    Router::new()
        .route("/logo.png", get(logo))
        .route("/favicon.ico", get(favicon))
        .fallback(block_page)
        .with_state(page)
}

async fn logo(State(page): State<PageState>) -> Response {
    serve_asset(&page.logo, "image/png").await
}

async fn favicon(State(page): State<PageState>) -> Response {
    serve_asset(&page.logo, "image/x-icon").await
}

async fn serve_asset(path: &Path, content_type: &'static str) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "static asset unavailable");
            (StatusCode::NOT_FOUND, "File Not Found").into_response()
        }
    }
}

async fn block_page(State(page): State<PageState>, headers: HeaderMap) -> Html<String> {
    let domain = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(UNKNOWN_DOMAIN);
    let reason = page.state.blocklist.reason(domain).unwrap_or(NO_REASON);
    debug!(domain, "serving block page");
    Html(render_block_page(domain, reason))
}

pub fn render_block_page(domain: &str, reason: &str) -> String {
    let domain = escape_html(domain);
    let reason = escape_html(reason);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Blocked</title>
    <link rel="icon" href="favicon.ico" type="image/x-icon">
    <style>
        body {{ font-family: Arial, sans-serif; text-align: center; margin-top: 50px; }}
        .container {{ max-width: 800px; margin: auto; }}
        .blocked {{ font-size: 24px; color: red; font-weight: bold; }}
        .reason {{ font-size: 18px; margin-top: 20px; }}
        .footer {{ margin-top: 50px; font-size: 12px; color: #555; }}
        img.logo {{ width: 300px; margin-top: 20px; }}
    </style>
</head>
<body>
    <div class="container">
        <img src="logo.png" alt="Logo" class="logo">
        <div class="blocked">The domain "{domain}" is blocked.</div>
        <div class="reason">{reason}</div>
    </div>
    <div class="footer">
        <p>This request was answered by the network's DNS sinkhole.</p>
    </div>
</body>
</html>
"#
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct BlockPageServer {
    listener: TcpListener,
    app: Router,
}

impl BlockPageServer {
    pub async fn bind(config: &Config, state: Arc<ServerState>) -> Result<Self, BindError> {
        let listener = TcpListener::bind(config.http_bind)
            .await
            .map_err(|e| BindError::http(config.http_bind, e))?;
        Ok(Self {
            listener,
            app: router(state, &config.static_dir),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` flips to true; open connections are allowed to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        if let Ok(addr) = self.local_addr() {
            info!(addr = %addr, "block page listening on http://{}", addr);
        }
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await?;
        info!("block page server stopped");
        Ok(())
    }
}
