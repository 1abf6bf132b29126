//! Server variable providers used when resolving `{VAR}` and `%{VAR}`
//! tokens.
//!
//! A [`RewriteContext`](super::RewriteContext) consults its own request state
//! first and falls back to the providers attached to it, in order.

use std::fmt::Debug;
use std::io;
use std::net::ToSocketAddrs;

use chrono::{DateTime, Local};
use once_cell::sync::OnceCell;

macro_rules! setter {
    ($key:ident, $ref:ident) => {
        #[doc = concat!("Assign value for `", stringify!($ref), "` variable")]
        pub fn $key<S: Into<String>>(mut self, $key: S) -> Self {
            self.$key = Some($key.into());
            self
        }
    };
}

/// Abstraction for server variable providers.
///
/// Supply objects implementing this trait to
/// [`RewriteContext::with_provider`](super::RewriteContext::with_provider).
pub trait ContextProvider: Debug {
    fn fill(&self, key: &str) -> Option<String>;
}

/// Environment Variable Context.
///
/// Provides variables associated with the `ENV:` prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvCtx;

impl ContextProvider for EnvCtx {
    fn fill(&self, key: &str) -> Option<String> {
        let (prefix, env) = key.split_once(':')?;
        if !prefix.eq_ignore_ascii_case("env") {
            return None;
        }
        std::env::var(env).ok()
    }
}

/// All variables associated with the `TIME` prefix.
///
/// The clock is read once, the first time a `TIME*` variable is resolved, so
/// requests that never ask for the time pay nothing.
#[derive(Clone, Debug, Default)]
pub struct DateCtx {
    now: OnceCell<DateTime<Local>>,
}

impl DateCtx {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every variable against a fixed point in time.
    pub fn at(time: DateTime<Local>) -> Self {
        Self {
            now: OnceCell::with_value(time),
        }
    }

    #[inline]
    fn now(&self) -> &DateTime<Local> {
        self.now.get_or_init(Local::now)
    }
}

impl ContextProvider for DateCtx {
    fn fill(&self, key: &str) -> Option<String> {
        let format = match key.to_ascii_uppercase().as_str() {
            "TIME_YEAR" => "%Y",
            "TIME_MONTH" => "%m",
            "TIME_DAY" => "%d",
            "TIME_HOUR" => "%H",
            "TIME_MIN" => "%M",
            "TIME_SEC" => "%S",
            "TIME_WDAY" => "%w",
            "TIME" => "%Y%m%d%H%M%S",
            _ => return None,
        };
        Some(self.now().format(format).to_string())
    }
}

/// Server attributes such as `SERVER_ADDR` and `DOCUMENT_ROOT`.
#[derive(Clone, Debug, Default)]
pub struct ServerCtx {
    document_root: Option<String>,
    server_addr: Option<String>,
    server_admin: Option<String>,
    server_protocol: Option<String>,
    server_software: Option<String>,
}

impl ServerCtx {
    setter!(document_root, DOCUMENT_ROOT);
    setter!(server_admin, SERVER_ADMIN);
    setter!(server_protocol, SERVER_PROTOCOL);
    setter!(server_software, SERVER_SOFTWARE);

    /// Assign value for the `SERVER_ADDR` variable.
    pub fn server_addr<A: ToSocketAddrs>(mut self, server_addr: A) -> io::Result<Self> {
        let addr = server_addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "missing socket address")
        })?;
        self.server_addr = Some(addr.ip().to_string());
        Ok(self)
    }
}

impl ContextProvider for ServerCtx {
    fn fill(&self, key: &str) -> Option<String> {
        match key.to_ascii_uppercase().as_str() {
            "DOCUMENT_ROOT" => self.document_root.clone(),
            "SERVER_ADMIN" => self.server_admin.clone(),
            "SERVER_ADDR" | "LOCAL_ADDR" => self.server_addr.clone(),
            "SERVER_PROTOCOL" => self.server_protocol.clone(),
            "SERVER_SOFTWARE" => self.server_software.clone(),
            _ => None,
        }
    }
}

/// Connection level request variables such as `REMOTE_ADDR`.
#[derive(Clone, Debug, Default)]
pub struct RequestCtx {
    auth_type: Option<String>,
    path_info: Option<String>,
    remote_addr: Option<String>,
    remote_port: Option<String>,
    ipv6: Option<String>,
}

impl RequestCtx {
    setter!(auth_type, AUTH_TYPE);
    setter!(path_info, PATH_INFO);

    /// Assign value for `REMOTE_ADDR`, `REMOTE_PORT` and `IPV6` variables.
    pub fn remote_addr<A: ToSocketAddrs>(mut self, remote_addr: A) -> io::Result<Self> {
        let addr = remote_addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "missing socket address")
        })?;
        self.remote_addr = Some(addr.ip().to_string());
        self.remote_port = Some(addr.port().to_string());
        self.ipv6 = Some(if addr.is_ipv6() { "on" } else { "off" }.to_owned());
        Ok(self)
    }

    /// Assign remote address variables if address is Some.
    pub fn maybe_remote_addr<A: ToSocketAddrs>(self, remote_addr: Option<A>) -> io::Result<Self> {
        match remote_addr {
            Some(addr) => self.remote_addr(addr),
            None => Ok(self),
        }
    }
}

impl ContextProvider for RequestCtx {
    fn fill(&self, key: &str) -> Option<String> {
        match key.to_ascii_uppercase().as_str() {
            "AUTH_TYPE" => self.auth_type.clone(),
            "PATH_INFO" => self.path_info.clone(),
            "REMOTE_ADDR" | "REMOTE_HOST" => self.remote_addr.clone(),
            "REMOTE_PORT" => self.remote_port.clone(),
            "IPV6" => self.ipv6.clone(),
            _ => None,
        }
    }
}
