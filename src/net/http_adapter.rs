use actix_files::Files;
use actix_rewrite::{Engine, ServerCtx, url_rewrite};
use actix_web::{App, HttpServer, web};

use crate::core::configuration::Configuration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_STATIC_PATH: &str = "/var/www/html/";
const DEFAULT_DOCUMENT: &str = "index.html";
const DEFAULT_REMOTE_PATH: &str = "/";

pub struct HttpAdapter<'a> {
    configuration: &'a Configuration,
    engine: url_rewrite::Engine,
}

impl<'a> HttpAdapter<'a> {
    pub fn new(configuration: &'a Configuration, engine: url_rewrite::Engine) -> Self {
        Self {
            configuration,
            engine,
        }
    }

    pub async fn run(&self) -> Result<(), std::io::Error> {
        let host = self
            .configuration
            .network
            .as_ref()
            .and_then(|f| f.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = self
            .configuration
            .network
            .as_ref()
            .and_then(|f| f.port)
            .unwrap_or(DEFAULT_PORT);

        let static_path = self
            .configuration
            ._static
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| DEFAULT_STATIC_PATH.to_string());

        let remote_path = self
            .configuration
            ._static
            .as_ref()
            .and_then(|s| s.remote_path.clone())
            .unwrap_or_else(|| DEFAULT_REMOTE_PATH.to_string());

        let index = self
            .configuration
            ._static
            .as_ref()
            .and_then(|s| s.index.clone())
            .unwrap_or_else(|| DEFAULT_DOCUMENT.to_string());

        let engine = Engine::new(self.engine.clone()).server_context(
            ServerCtx::default()
                .document_root(static_path.clone())
                .server_software(concat!("rewrite-hub/", env!("CARGO_PKG_VERSION"))),
        );

        tracing::info!(%host, port, rules = self.engine.len(), "starting http server");
        HttpServer::new(move || {
            App::new()
                .wrap(engine.clone().middleware())
                .configure(|cfg: &mut web::ServiceConfig| {
                    config(cfg, &remote_path, &static_path, &index)
                })
        })
        .bind(format!("{host}:{port}"))?
        .run()
        .await
    }
}

fn config(cfg: &mut web::ServiceConfig, remote_path: &str, static_path: &str, index: &str) {
    cfg.service(
        Files::new(remote_path, static_path)
            .index_file(index)
            .use_last_modified(true)
            .prefer_utf8(true),
    );
}
