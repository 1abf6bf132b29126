//! Actix-Web Middleware applying [`url_rewrite`] rules to incoming requests.
//!
//! Rules may come from IIS URL Rewrite xml, from HTTPd's
//! [`mod_rewrite`](https://httpd.apache.org/docs/current/mod/mod_rewrite.html)
//! directives or from code. Internal rewrites replace the request uri before
//! it reaches the wrapped service, redirects and custom responses are
//! answered directly.
//!
//! # Example
//!
//! ```
//! use actix_web::App;
//! use actix_rewrite::{Engine, RewriteOptions};
//!
//! let engine: Engine = RewriteOptions::new()
//!     .redirect_to_https_permanent()
//!     .add_apache_mod_rewrite(r#"
//!         RewriteRule ^/file/(.*)$     /tmp/$1      [L]
//!         RewriteRule ^/redirect/(.*)$ /location/$1 [R=302]
//!         RewriteRule ^/blocked/       -            [F]
//!     "#)
//!     .expect("failed to process rules")
//!     .into();
//!
//! let app = App::new()
//!   .wrap(engine.middleware());
//! ```
mod error;
mod middleware;
mod rewrite;
pub mod util;

pub use error::Error;
pub use middleware::{Middleware, RewriteService};
pub use rewrite::{Engine, Rewrite};

pub use url_rewrite;
pub use url_rewrite::RewriteOptions;
pub use url_rewrite::context::ServerCtx;
