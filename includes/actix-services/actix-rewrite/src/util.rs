//! Conversions between Actix-Web requests and [`RewriteContext`].

use std::str::FromStr;

use actix_http::Uri;
use actix_http::uri::{Authority, PathAndQuery, Scheme};
use actix_web::HttpRequest;
use url_rewrite::RewriteContext;
use url_rewrite::context::{RequestCtx, ServerCtx};

use super::error::Error;

/// Build a [`RewriteContext`] from the request line, connection info and
/// headers of an [`HttpRequest`].
pub fn rewrite_context(req: &HttpRequest) -> RewriteContext {
    let uri = req.uri();
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let info = req.connection_info();
    let mut ctx = RewriteContext::new(path_and_query)
        .with_scheme(info.scheme())
        .with_host(info.host())
        .with_method(req.method().as_str());
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), value);
        }
    }
    ctx
}

/// Build [`url_rewrite::context::RequestCtx`]
/// using [`HttpRequest`] data.
pub fn request_ctx(req: &HttpRequest) -> Result<RequestCtx, Error> {
    Ok(RequestCtx::default()
        .path_info(req.match_info().unprocessed())
        .maybe_remote_addr(req.peer_addr())?)
}

/// Fill [`url_rewrite::context::ServerCtx`]
/// using [`HttpRequest`] data.
pub fn fill_server_ctx(ctx: ServerCtx, req: &HttpRequest) -> Result<ServerCtx, Error> {
    Ok(ctx
        .server_addr(req.app_config().local_addr())?
        .server_protocol(format!("{:?}", req.version())))
}

/// Scheme, host and port a request arrived with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    pub fn of(ctx: &RewriteContext) -> Self {
        Self {
            scheme: ctx.scheme().to_owned(),
            host: ctx.host().to_owned(),
            port: ctx.port(),
        }
    }

    fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }
}

/// Build the uri the inner service sees after an internal rewrite.
///
/// Scheme and authority are kept from the original request unless a rule
/// rewrote them, in which case the uri becomes absolute. A relative
/// rewritten path gains a leading `/`, an asterisk-form target is kept.
pub fn join_uri(before: &Uri, origin: &Origin, ctx: &RewriteContext) -> Result<Uri, Error> {
    let mut target = match ctx.path() {
        "*" => "*".to_owned(),
        path if path.starts_with('/') => path.to_owned(),
        path => format!("/{path}"),
    };
    if !ctx.query().is_empty() {
        target.push('?');
        target.push_str(ctx.query());
    }
    let mut parts = before.clone().into_parts();
    let after = Origin::of(ctx);
    if after != *origin && !after.host.is_empty() {
        parts.scheme = Some(Scheme::from_str(&after.scheme)?);
        parts.authority = Some(Authority::from_str(&after.authority())?);
    }
    parts.path_and_query = Some(PathAndQuery::from_str(&target)?);
    Ok(Uri::from_parts(parts)?)
}
