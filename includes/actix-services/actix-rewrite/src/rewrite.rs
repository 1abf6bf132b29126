//! Utilities for Actix-Web Rewrite Actions

use actix_http::{StatusCode, Uri};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};
use url_rewrite::context::ServerCtx;
use url_rewrite::{Response, RewriteOptions};

use crate::Middleware;

use super::error::Error;
use super::util;

/// Actix-Web compatible outcome of a rewrite.
pub enum Rewrite {
    Uri(Uri),
    Redirect(HttpResponse),
    Response(HttpResponse),
}

#[derive(Clone, Debug, Default)]
/// Actix-Web compatible wrapper on [`Engine`](url_rewrite::Engine)
pub struct Engine {
    engine: url_rewrite::Engine,
    srv_ctx: ServerCtx,
}

impl Engine {
    /// Creates a new [`Engine`](crate::Engine) instance around an already
    /// assembled rule list.
    pub fn new(engine: url_rewrite::Engine) -> Self {
        Self {
            engine,
            srv_ctx: ServerCtx::default(),
        }
    }

    /// Pass a configured [`ServerCtx`](crate::ServerCtx) instance
    /// to the engine to use when running [`Engine::rewrite`]
    pub fn server_context(mut self, ctx: ServerCtx) -> Self {
        self.srv_ctx = ctx;
        self
    }

    #[inline]
    pub fn rules(&self) -> &url_rewrite::Engine {
        &self.engine
    }

    /// Evaluates the given [`HttpRequest`](actix_web::HttpRequest) against
    /// the engine rules and returns a [`Rewrite`] response.
    pub fn rewrite(&self, req: &HttpRequest) -> Result<Rewrite, Error> {
        let mut ctx = util::rewrite_context(req)
            .with_defaults()
            .with_provider(util::request_ctx(req)?)
            .with_provider(util::fill_server_ctx(self.srv_ctx.clone(), req)?);
        let origin = util::Origin::of(&ctx);
        self.engine.apply(&mut ctx)?;
        Ok(match ctx.response() {
            Some(Response::Redirect { status, location }) => Rewrite::Redirect(
                HttpResponse::build(StatusCode::from_u16(*status)?)
                    .insert_header((header::LOCATION, location.as_str()))
                    .finish(),
            ),
            Some(Response::Status { status, reason }) => {
                let mut res = HttpResponse::build(StatusCode::from_u16(*status)?);
                Rewrite::Response(match reason {
                    Some(reason) => res.body(reason.clone()),
                    None => res.finish(),
                })
            }
            Some(Response::Abort) => {
                Rewrite::Response(HttpResponse::BadRequest().force_close().finish())
            }
            None => Rewrite::Uri(util::join_uri(req.uri(), &origin, &ctx)?),
        })
    }

    /// Converts Engine Instance into Actix-Web Middleware
    ///
    /// # Examples
    ///
    /// ```
    /// use actix_web::App;
    /// use actix_rewrite::Engine;
    ///
    /// let engine: Engine = "RewriteRule ^/old/(.*)$ /new/$1 [L]"
    ///     .parse::<actix_rewrite::url_rewrite::Engine>()
    ///     .expect("failed to parse rules")
    ///     .into();
    ///
    /// let app = App::new()
    ///     .wrap(engine.middleware());
    /// ```
    #[inline]
    pub fn middleware(self) -> Middleware {
        self.into()
    }
}

impl From<url_rewrite::Engine> for Engine {
    #[inline]
    fn from(engine: url_rewrite::Engine) -> Self {
        Self::new(engine)
    }
}

impl From<&RewriteOptions> for Engine {
    #[inline]
    fn from(options: &RewriteOptions) -> Self {
        Self::new(options.build())
    }
}

impl From<&mut RewriteOptions> for Engine {
    #[inline]
    fn from(options: &mut RewriteOptions) -> Self {
        Self::new(options.build())
    }
}
