//! CLI launcher for the embeddable SNMP agent: binds a UDP transport,
//! wires up the bundled example MIB (system group + UCD load/disk
//! group), and serves until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use snmp_agent::config::{AgentConfig, AuthProtocolConfig, PrivProtocolConfig};
use snmp_agent::master::MasterAgent;
use snmp_agent::mibs;
use snmp_agent::pdu::EnabledVersions;
use snmp_agent::security::{AuthProtocol, EngineId, PrivProtocol, SecurityConfig, UsmUser};
use snmp_agent::server::SnmpServer;
use snmp_agent::subagent::SubAgent;
use snmp_agent::transport::UdpTransport;
use snmp_agent::Result;

#[derive(Parser)]
#[command(name = "snmp-agent")]
#[command(about = "Embeddable SNMP v1/v2c/v3 agent")]
#[command(version = snmp_agent::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// UDP bind address, e.g. 0.0.0.0:161
    #[arg(long, value_name = "HOST:PORT")]
    bind_to: Option<String>,

    /// v1/v2c community string accepted by the default sub-agent
    #[arg(long)]
    community: Option<String>,

    /// SNMPv3 username
    #[arg(long)]
    v3_username: Option<String>,

    /// SNMPv3 authentication passphrase (MD5/SHA)
    #[arg(long)]
    v3_authentication_passphrase: Option<String>,

    /// SNMPv3 privacy passphrase (DES/AES)
    #[arg(long)]
    v3_privacy_passphrase: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent (default)
    Run,
    /// Validate configuration and exit
    ValidateConfig,
    /// Print a default configuration to stdout or a file
    GenerateConfig {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(&cli)?;
    apply_cli_overrides(&mut config, &cli);
    snmp_agent::utils::setup_logging(&config.logging)?;

    info!("Starting {} v{}", snmp_agent::NAME, snmp_agent::VERSION);

    match &cli.command {
        Some(Commands::ValidateConfig) => {
            config.validate()?;
            println!("configuration is valid");
            Ok(())
        }
        Some(Commands::GenerateConfig { output }) => generate_default_config(output.clone()),
        Some(Commands::Run) | None => {
            let community = cli.community.clone().unwrap_or_else(|| "public".to_string());
            run_agent(config, community).await
        }
    }
}

fn load_configuration(cli: &Cli) -> Result<AgentConfig> {
    if let Some(path) = &cli.config {
        AgentConfig::load_from_file(path)
    } else {
        match AgentConfig::load_from_env() {
            Ok(config) => Ok(config),
            Err(_) => Ok(AgentConfig::default_config()),
        }
    }
}

fn apply_cli_overrides(config: &mut AgentConfig, cli: &Cli) {
    if let Some(bind_to) = &cli.bind_to {
        if let Some((host, port)) = bind_to.rsplit_once(':') {
            config.general.bind_address = host.to_string();
            if let Ok(port) = port.parse() {
                config.general.port = port;
            }
        }
    }
    config.logging.level = cli.log_level.clone();
    if let Some(username) = &cli.v3_username {
        config.security.users.push(snmp_agent::config::UsmUserConfig {
            username: username.clone(),
            auth_protocol: if cli.v3_authentication_passphrase.is_some() {
                AuthProtocolConfig::Sha
            } else {
                AuthProtocolConfig::None
            },
            auth_passphrase: cli.v3_authentication_passphrase.clone(),
            priv_protocol: if cli.v3_privacy_passphrase.is_some() {
                PrivProtocolConfig::Aes
            } else {
                PrivProtocolConfig::None
            },
            priv_passphrase: cli.v3_privacy_passphrase.clone(),
        });
    }
}

fn generate_default_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default_config();
    let toml_content = toml::to_string_pretty(&config)
        .map_err(|e| snmp_agent::Error::internal(format!("failed to serialize config: {e}")))?;
    match output {
        Some(path) => {
            std::fs::write(&path, toml_content)?;
            println!("default configuration written to: {}", path.display());
        }
        None => println!("{toml_content}"),
    }
    Ok(())
}

async fn run_agent(config: AgentConfig, community: String) -> Result<()> {
    config.validate()?;

    let mut security_config = SecurityConfig {
        no_security: config.security.no_security,
        engine_id: config
            .security
            .fixed_engine_id
            .as_ref()
            .and_then(|hex_str| hex::decode(hex_str).ok())
            .map(|data| EngineId::new(config.security.engine_id_pen, data))
            .or_else(|| Some(EngineId::random(config.security.engine_id_pen))),
        engine_boots: config.security.engine_boots,
        engine_time_fn: None,
        users: config
            .security
            .users
            .iter()
            .map(|u| {
                UsmUser::new(u.username.clone())
                    .with_auth(
                        match u.auth_protocol {
                            AuthProtocolConfig::None => AuthProtocol::None,
                            AuthProtocolConfig::Md5 => AuthProtocol::Md5,
                            AuthProtocolConfig::Sha => AuthProtocol::Sha,
                        },
                        u.auth_passphrase.clone().unwrap_or_default(),
                    )
                    .with_priv(
                        match u.priv_protocol {
                            PrivProtocolConfig::None => PrivProtocol::None,
                            PrivProtocolConfig::Des => PrivProtocol::Des,
                            PrivProtocolConfig::Aes => PrivProtocol::Aes,
                        },
                        u.priv_passphrase.clone().unwrap_or_default(),
                    )
            })
            .collect(),
        ..SecurityConfig::default()
    };
    security_config.ready_for_work();

    let start = Instant::now();
    let mut oids = mibs::system::oids(mibs::system::SystemIdentity {
        description: config.general.description.clone(),
        contact: config.general.contact.clone(),
        location: config.general.location.clone(),
        ..mibs::system::SystemIdentity::default()
    }, start);
    oids.extend(mibs::ucd::load_oids());
    oids.extend(mibs::ucd::disk_oids());

    let sub_agent = Arc::new(SubAgent::with_oids(vec![community], oids));
    sub_agent.sync_config().await?;

    let mut master = MasterAgent::new(security_config, vec![sub_agent]);
    master.allowed_versions = allowed_versions(&config);
    master.ready_for_work().await?;

    let bind = format!("{}:{}", config.general.bind_address, config.general.port);
    let addr: std::net::SocketAddr = bind
        .parse()
        .map_err(|e| snmp_agent::Error::parse(format!("invalid bind address {bind:?}: {e}")))?;
    let transport = UdpTransport::bind(addr).await?;
    info!(%bind, "SNMP agent listening");

    let server = SnmpServer::new(transport, master);

    tokio::select! {
        result = server.serve_forever() => {
            if let Err(err) = result {
                error!(error = %err, "SNMP server loop exited with an error");
                return Err(err);
            }
        }
        _ = signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
            server.shutdown().await;
        }
    }

    info!("SNMP agent shutdown complete");
    Ok(())
}

fn allowed_versions(config: &AgentConfig) -> EnabledVersions {
    let mut versions = EnabledVersions::none();
    for version in &config.general.versions {
        versions = versions.union(match version {
            snmp_agent::config::SnmpVersion::V1 => EnabledVersions::V1,
            snmp_agent::config::SnmpVersion::V2c => EnabledVersions::V2C,
            snmp_agent::config::SnmpVersion::V3 => EnabledVersions::V3,
        });
    }
    versions
}
