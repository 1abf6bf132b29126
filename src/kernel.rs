use actix_rewrite::RewriteOptions;
use actix_rewrite::url_rewrite::{self, error::ParseError};
use clap::Parser;

use crate::{
    core::{
        cli,
        configuration::{self, Configuration, ConfigurationError, RuleFormat},
    },
    net::http_adapter::HttpAdapter,
};

/// boot up the application kernel
/// ``` rust,ignore
/// let krn = kernel::boot().await?;
/// ```
pub async fn boot() -> Result<Kernel, ConfigurationError> {
    let cli = cli::Cli::parse();
    let conf = configuration::load_configuration(&cli.configuration_path).await?;
    tracing::info!(path = %cli.configuration_path, "configuration loaded");

    let engine = build_engine(&conf)?;
    tracing::info!(rules = engine.len(), "rewrite rules compiled");

    Ok(Kernel::new(conf, engine, cli.check))
}

/// Compile every configured rule source, in declaration order, into one
/// engine. The https redirect, when configured, runs first.
pub fn build_engine(conf: &Configuration) -> Result<url_rewrite::Engine, ParseError> {
    let mut options = RewriteOptions::new();
    let Some(rewrite) = conf.rewrite.as_ref() else {
        return Ok(options.build());
    };

    if let Some(https) = rewrite.https_redirect.as_ref() {
        options.redirect_to_https_with(https.status.unwrap_or(302), https.ssl_port)?;
    }

    for source in &rewrite.sources {
        match (source.format, source.path.as_ref(), source.rules.as_ref()) {
            (RuleFormat::Iis, Some(path), _) => {
                options.add_iis_url_rewrite_file(path)?;
            }
            (RuleFormat::Iis, None, Some(rules)) => {
                options.add_iis_url_rewrite(rules)?;
            }
            (RuleFormat::Apache, Some(path), _) => {
                options.add_apache_mod_rewrite_file(path)?;
            }
            (RuleFormat::Apache, None, Some(rules)) => {
                options.add_apache_mod_rewrite(rules)?;
            }
            (format, None, None) => {
                tracing::warn!(?format, "rule source without path or rules ignored")
            }
        }
    }
    Ok(options.build())
}

/// The application kernel, responsible for managing the application's lifecycle and providing access to its core components.
pub struct Kernel {
    configuration: Configuration,
    engine: url_rewrite::Engine,
    check: bool,
}

impl Kernel {
    pub fn new(configuration: Configuration, engine: url_rewrite::Engine, check: bool) -> Self {
        Self {
            configuration,
            engine,
            check,
        }
    }

    /// Whether the process should stop once the configuration was validated.
    pub fn check_only(&self) -> bool {
        self.check
    }

    pub fn setup_http_adapter(&self) -> HttpAdapter<'_> {
        HttpAdapter::new(&self.configuration, self.engine.clone())
    }
}
