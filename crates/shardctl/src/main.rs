//! shardctl — operate a ShardGrid cluster.
//!
//! Every invocation opens the on-disk coordination store, performs one
//! controller operation and prints its result as JSON. Several shardctl
//! processes may run against the same cluster; conflicting writes are
//! retried by the controller.
//!
//! # Usage
//!
//! ```text
//! shardctl --data-dir /var/lib/shardgrid instance add --role server --host 10.0.0.1 --port 8098
//! shardctl tenant create-server acme --instances 6 --offline 3 --realtime 3
//! shardctl table create events --replication 3 --server-tenant acme --broker-tenant acme
//! shardctl segment add events_OFFLINE events_0 --url s3://segments/events_0.tar.gz
//! shardctl status
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "shardctl",
    about = "ShardGrid — segment placement for distributed tables",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to shardgrid.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the coordination store (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and list instances
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },
    /// Create and list tenants
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },
    /// Create, delete and list tables
    Table {
        #[command(subcommand)]
        action: TableAction,
    },
    /// Upload, delete and list segments
    Segment {
        #[command(subcommand)]
        action: SegmentAction,
    },
    /// Print tenants, tables and per-pool placement counts
    Status,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum InstanceAction {
    /// Register an untagged instance
    Add {
        #[arg(long, value_enum)]
        role: RoleArg,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
    },
    /// List registered instances
    List,
}

#[derive(Subcommand)]
enum TenantAction {
    /// Claim untagged servers for a tenant
    CreateServer {
        name: String,
        /// Number of servers to claim.
        #[arg(long)]
        instances: u32,
        /// Servers tagged for offline tables (default: all).
        #[arg(long)]
        offline: Option<u32>,
        /// Servers tagged for realtime tables (default: all).
        #[arg(long)]
        realtime: Option<u32>,
    },
    /// Claim untagged brokers for a tenant
    CreateBroker {
        name: String,
        #[arg(long)]
        instances: u32,
    },
    /// List tenants
    List,
}

#[derive(Subcommand)]
enum TableAction {
    /// Create a table on a server tenant's pool
    Create {
        name: String,
        #[arg(long, default_value_t = 1)]
        replication: u32,
        #[arg(long)]
        server_tenant: String,
        #[arg(long)]
        broker_tenant: String,
        #[arg(long, value_enum, default_value = "offline")]
        table_type: TableTypeArg,
        /// Segment assignment strategy (e.g. random, balance_num_segment).
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Delete a table resource and all of its segments
    Delete { resource: String },
    /// List tables
    List,
}

#[derive(Subcommand)]
enum SegmentAction {
    /// Place a new segment, or refresh an existing one
    Add {
        resource: String,
        segment: String,
        /// Where servers download the segment from.
        #[arg(long)]
        url: String,
    },
    /// Remove a segment from its table
    Delete { resource: String, segment: String },
    /// List segments of a table with their replicas
    List { resource: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Server,
    Broker,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableTypeArg {
    Offline,
    Realtime,
    /// Both an offline and a realtime resource.
    Hybrid,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = commands::load_config(cli.config.as_deref(), cli.data_dir)?;
    let open = || commands::open_manager(&config);

    let output = match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            return Ok(());
        }
        Commands::Instance { action } => {
            let manager = open()?;
            match action {
                InstanceAction::Add { role, host, port } => {
                    commands::instance::add(&manager, role.into(), &host, port)?
                }
                InstanceAction::List => commands::instance::list(&manager)?,
            }
        }
        Commands::Tenant { action } => {
            let manager = open()?;
            match action {
                TenantAction::CreateServer {
                    name,
                    instances,
                    offline,
                    realtime,
                } => {
                    commands::tenant::create_server(&manager, &name, instances, offline, realtime)
                        .await?
                }
                TenantAction::CreateBroker { name, instances } => {
                    commands::tenant::create_broker(&manager, &name, instances).await?
                }
                TenantAction::List => commands::tenant::list(&manager)?,
            }
        }
        Commands::Table { action } => {
            let manager = open()?;
            match action {
                TableAction::Create {
                    name,
                    replication,
                    server_tenant,
                    broker_tenant,
                    table_type,
                    strategy,
                } => commands::table::create(
                    &manager,
                    commands::table::CreateArgs {
                        name,
                        replication,
                        server_tenant,
                        broker_tenant,
                        table_types: table_type.types(),
                        strategy,
                    },
                )?,
                TableAction::Delete { resource } => {
                    commands::table::delete(&manager, &resource).await?
                }
                TableAction::List => commands::table::list(&manager)?,
            }
        }
        Commands::Segment { action } => {
            let manager = open()?;
            match action {
                SegmentAction::Add {
                    resource,
                    segment,
                    url,
                } => commands::segment::add(&manager, &resource, &segment, &url).await?,
                SegmentAction::Delete { resource, segment } => {
                    commands::segment::delete(&manager, &resource, &segment).await?
                }
                SegmentAction::List { resource } => commands::segment::list(&manager, &resource)?,
            }
        }
        Commands::Status => commands::status(&open()?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardctl=debug,shardgrid=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

impl From<RoleArg> for shardgrid_state::Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Server => shardgrid_state::Role::Server,
            RoleArg::Broker => shardgrid_state::Role::Broker,
        }
    }
}

impl TableTypeArg {
    fn types(self) -> Vec<shardgrid_state::TableType> {
        use shardgrid_state::TableType;
        match self {
            TableTypeArg::Offline => vec![TableType::Offline],
            TableTypeArg::Realtime => vec![TableType::Realtime],
            TableTypeArg::Hybrid => vec![TableType::Offline, TableType::Realtime],
        }
    }
}
