//! Actix-Web middleware running the rewrite [`Engine`] ahead of the wrapped
//! service.

use std::future::{Ready, ready};
use std::{ops::Deref, rc::Rc};

use actix_web::{
    HttpMessage,
    body::BoxBody,
    dev::{
        ConnectionInfo, Path, Service, ServiceRequest, ServiceResponse, Transform, Url,
        forward_ready,
    },
    error::Error as ActixError,
    http::header::{self, HeaderValue},
};
use futures_core::future::LocalBoxFuture;

use crate::rewrite::{Engine, Rewrite};

/// Url rewrite middleware
///
/// `Middleware` must be registered with `App::wrap()` method.
///
/// # Examples
///
/// ```
/// use actix_web::App;
/// use actix_rewrite::{Engine, Middleware, RewriteOptions};
///
/// let engine = RewriteOptions::new()
///     .add_apache_mod_rewrite(r#"
///         RewriteRule ^/file/(.*)$     /tmp/$1      [L]
///         RewriteRule ^/redirect/(.*)$ /location/$1 [R=302]
///         RewriteRule ^/blocked/       -            [F]
///     "#)
///     .expect("failed to process rules")
///     .build();
///
/// let app = App::new().wrap(Middleware::new(Engine::new(engine)));
/// ```
pub struct Middleware(Rc<Engine>);

impl Middleware {
    /// Creates a new rewrite middleware instance
    #[inline]
    pub fn new(engine: Engine) -> Self {
        Self(Rc::new(engine))
    }
}

impl From<Engine> for Middleware {
    #[inline]
    fn from(value: Engine) -> Self {
        Self::new(value)
    }
}

impl<S> Transform<S, ServiceRequest> for Middleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = ActixError> + 'static,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = ActixError;
    type InitError = ();
    type Transform = RewriteService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RewriteService(Rc::new(RewriteInner {
            service: Rc::new(service),
            engine: self.0.clone(),
        }))))
    }
}

/// Assembled rewrite service
#[derive(Clone)]
pub struct RewriteService<S>(Rc<RewriteInner<S>>);

impl<S> Deref for RewriteService<S> {
    type Target = RewriteInner<S>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct RewriteInner<S> {
    service: Rc<S>,
    engine: Rc<Engine>,
}

impl<S> Service<ServiceRequest> for RewriteService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = ActixError> + 'static,
    S::Future: 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let this = Rc::clone(&self.0);
        Box::pin(async move {
            let uri = match this
                .engine
                .rewrite(req.request())
                .inspect_err(|err| tracing::error!("rewrite failed {err:?}"))?
            {
                Rewrite::Uri(uri) => uri,
                Rewrite::Redirect(res) => return Ok(req.into_response(res)),
                Rewrite::Response(res) => return Ok(req.into_response(res)),
            };

            if &uri != req.uri() {
                tracing::debug!(before = %req.uri(), after = %uri, "request rewritten");
                if let Some(host) = uri
                    .authority()
                    .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
                {
                    req.headers_mut().insert(header::HOST, host);
                    req.extensions_mut().remove::<ConnectionInfo>();
                }
                req.head_mut().uri = uri.clone();
                *req.match_info_mut() = Path::new(Url::new(uri));
            }

            this.service.call(req).await
        })
    }
}
