use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Yaml or toml configuration file
    #[arg(short, long, default_value = "conf.yaml")]
    pub configuration_path: String,

    /// Parse the configured rewrite rules and exit
    #[arg(long)]
    pub check: bool,
}
