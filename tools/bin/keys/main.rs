use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};

use common::config::KeyProviderKind;
use common::keys::KeyService;

// key configuration management for the file pipeline server
//
// the server reads the json key file once at startup; this tool is the
// only writer.

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// key configuration file
    #[arg(short, long, default_value = "hsm_config.json")]
    config: PathBuf,

    /// how hsm entries resolve to key material
    #[arg(short, long, default_value = "http")]
    provider: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// manage crypt4gh hsm server entries
    Hsm {
        #[command(subcommand)]
        hsmcmd: HsmCommands,
    },

    /// manage rsa keys for the token envelope
    Rsa {
        #[command(subcommand)]
        rsacmd: RsaCommands,
    },
}

#[derive(Subcommand)]
enum HsmCommands {
    /// show configured hsm servers
    List,

    /// add a new hsm server entry
    Add {
        /// name for the entry
        #[arg()]
        name: String,

        /// url (or local identifier) of the key
        #[arg()]
        identifier: String,
    },

    /// remove an hsm server entry
    Remove {
        /// name of the entry
        #[arg()]
        name: String,
    },

    /// replace the identifier of an existing entry
    Update {
        /// name of the entry
        #[arg()]
        name: String,

        /// new url (or local identifier)
        #[arg()]
        identifier: String,
    },

    /// re-read the file, validate it, and resolve every key
    Reload,

    /// create a fresh configuration file
    Init {
        /// overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum RsaCommands {
    /// show configured rsa key names
    List,

    /// add or replace an rsa key from a pem file
    Add {
        /// name for the key, e.g. server_private_key
        #[arg()]
        name: String,

        /// path to the pem file
        #[arg()]
        key_file: PathBuf,
    },

    /// remove an rsa key
    Remove {
        /// name of the key
        #[arg()]
        name: String,
    },

    /// print the pem content of an rsa key
    Show {
        /// name of the key
        #[arg()]
        name: String,
    },
}

fn provider_kind(name: &str) -> Result<KeyProviderKind> {
    match name.to_lowercase().as_str() {
        "http" => Ok(KeyProviderKind::Http),
        "local" => Ok(KeyProviderKind::Local),
        other => Err(anyhow!("invalid provider {other:?}, expected http or local")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let provider = provider_kind(&cli.provider)?;

    match &cli.command {
        Commands::Hsm { hsmcmd } => match hsmcmd {
            HsmCommands::List => {
                let service = KeyService::load(&cli.config, provider)?;
                print_hsm_servers(&service);
            }
            HsmCommands::Add { name, identifier } => {
                let mut service = KeyService::load(&cli.config, provider)?;
                service.add_hsm_server(name, identifier)?;
                println!("added HSM server {name:?}: {identifier}");
            }
            HsmCommands::Remove { name } => {
                let mut service = KeyService::load(&cli.config, provider)?;
                service.remove_hsm_server(name)?;
                println!("removed HSM server {name:?}");
            }
            HsmCommands::Update { name, identifier } => {
                let mut service = KeyService::load(&cli.config, provider)?;
                service.update_hsm_server(name, identifier)?;
                println!("updated HSM server {name:?}: {identifier}");
            }
            HsmCommands::Reload => {
                let service = KeyService::load(&cli.config, provider)?;

                let problems = service.validate();
                if !problems.is_empty() {
                    for problem in &problems {
                        eprintln!("  - {problem}");
                    }
                    return Err(anyhow!("configuration validation failed"));
                }

                let client = reqwest::Client::new();
                let collection = service.key_collection(&client).await?;

                println!("configuration is valid, {} key(s) resolved", collection.len());
                print_hsm_servers(&service);
            }
            HsmCommands::Init { force } => {
                if cli.config.exists() && !force {
                    return Err(anyhow!(
                        "configuration file {} already exists, use --force to overwrite",
                        cli.config.display()
                    ));
                }

                KeyService::init(&cli.config, provider)?;
                println!("initialized configuration at {}", cli.config.display());
            }
        },
        Commands::Rsa { rsacmd } => match rsacmd {
            RsaCommands::List => {
                let service = KeyService::load(&cli.config, provider)?;
                let names = service.list_rsa_keys();

                if names.is_empty() {
                    println!("no RSA keys configured");
                } else {
                    println!("configured RSA keys:");
                    for name in names {
                        println!("  - {name}");
                    }
                }
            }
            RsaCommands::Add { name, key_file } => {
                let mut service = KeyService::load(&cli.config, provider)?;
                let pem = read_pem(key_file)?;
                service.add_rsa_key(name, &pem)?;
                println!("added RSA key {name:?}");
            }
            RsaCommands::Remove { name } => {
                let mut service = KeyService::load(&cli.config, provider)?;
                service.remove_rsa_key(name)?;
                println!("removed RSA key {name:?}");
            }
            RsaCommands::Show { name } => {
                let service = KeyService::load(&cli.config, provider)?;
                println!("{}", service.rsa_key(name)?);
            }
        },
    }

    Ok(())
}

fn print_hsm_servers(service: &KeyService) {
    let servers = service.list_hsm_servers();

    if servers.is_empty() {
        println!("no HSM servers configured");
        return;
    }

    println!("configured HSM servers:");
    for (name, identifier) in servers {
        println!("  {name}: {identifier}");
    }
}

fn read_pem(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}
