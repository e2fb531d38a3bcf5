use clap::{Args, Subcommand, ValueEnum};

use crate::config::{Config, ConfigValue};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        let sync = &config.sync;
                        let url = sync.server_url.value.as_deref().unwrap_or("(derived)");
                        println!("sync.server_url: {}", url);
                        println!("  source: {}", sync.server_url.source);
                        println!();

                        print_value("sync.hostname", &sync.hostname);
                        print_value("sync.secure", &sync.secure);
                        print_value("sync.port", &sync.port);
                        print_value("sync.production_host", &sync.production_host);
                        print_value("sync.reconnect_base_ms", &sync.reconnect_base_ms);
                        print_value("sync.max_reconnect_attempts", &sync.max_reconnect_attempts);
                        print_value("sync.heartbeat_interval_secs", &sync.heartbeat_interval_secs);
                        print_value("sync.connect_timeout_secs", &sync.connect_timeout_secs);

                        match sync.to_sync_config().ws_url() {
                            Ok(url) => println!("Resolved endpoint: {}", url),
                            Err(e) => println!("Resolved endpoint: invalid ({})", e),
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_value<T: std::fmt::Display>(name: &str, value: &ConfigValue<T>) {
    println!("{}: {}", name, value.value);
    println!("  source: {}", value.source);
    println!();
}
