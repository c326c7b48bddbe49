use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{codec, FaceDescriptor};
use std::io::Read;

// `#[zbus::proxy]` generates `FacegateProxy` and `FacegateProxyBlocking`.
#[zbus::proxy(
    interface = "org.freedesktop.Facegate1",
    default_service = "org.freedesktop.Facegate1",
    default_path = "/org/freedesktop/Facegate1"
)]
trait Facegate {
    async fn compare(&self, a: &[f64], b: &[f64]) -> zbus::Result<String>;
    async fn authenticate(
        &self,
        identity: &str,
        probe: &[f64],
        threshold_override: f64,
    ) -> zbus::Result<String>;
    async fn authenticate_group(
        &self,
        members: &[(String, Vec<f64>)],
        required_count: u32,
    ) -> zbus::Result<String>;
    async fn match_population(&self, probe: &[f64], threshold_override: f64) -> zbus::Result<String>;
    async fn register(&self, display_name: &str, handle: &str) -> zbus::Result<String>;
    async fn enroll(&self, identity: &str, descriptor_values: &[f64]) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn remove_identity(&self, identity: &str) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

/// Descriptors are given as a JSON array file or `-` for stdin, or as encoded
/// tokens with `--token`.
#[derive(Parser)]
#[command(name = "facegate", about = "Facegate face descriptor matching CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    /// Read descriptor arguments as encoded tokens instead of file paths
    #[arg(long = "token", global = true)]
    token_input: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new identity (no biometric enrollment yet)
    Register {
        display_name: String,
        /// Unique handle, e.g. an email address
        handle: String,
    },
    /// Enroll a face descriptor for an identity
    Enroll { identity: String, descriptor: String },
    /// Authenticate a probe descriptor against one identity
    Authenticate {
        identity: String,
        descriptor: String,
        /// Euclidean distance threshold (default: daemon configuration)
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Authenticate several identities at once against a quorum
    Group {
        /// Member as IDENTITY=DESCRIPTOR (repeatable)
        #[arg(short, long = "member", required = true)]
        members: Vec<String>,
        /// Members that must pass (default: all)
        #[arg(short, long)]
        required: Option<u32>,
    },
    /// Rank a probe descriptor against every enrolled identity
    Match {
        descriptor: String,
        /// Similarity threshold (default: daemon configuration)
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Only print the first N ranked matches
        #[arg(long)]
        top: Option<usize>,
    },
    /// Compare two descriptors with every metric
    Compare { a: String, b: String },
    /// List registered identities
    List,
    /// Remove an identity and its face samples
    Remove { identity: String },
    /// Show daemon status
    Status,
    /// Encode a descriptor into a token (offline)
    Encode { descriptor: String },
    /// Decode a token back into a JSON array (offline)
    Decode { token: String },
}

fn load_descriptor(spec: &str, token: bool) -> Result<FaceDescriptor> {
    if token {
        return codec::decode(spec).with_context(|| format!("{spec:?} is not a descriptor token"));
    }
    let raw = if spec == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading descriptor from stdin")?;
        buf
    } else {
        std::fs::read_to_string(spec).with_context(|| format!("reading {spec}"))?
    };
    serde_json::from_str(&raw).context("descriptor must be a JSON array of numbers")
}

fn wire(descriptor: &FaceDescriptor) -> Vec<f64> {
    descriptor.values().iter().map(|v| f64::from(*v)).collect()
}

fn parse_member(spec: &str, token: bool) -> Result<(String, Vec<f64>)> {
    let Some((identity, descriptor)) = spec.split_once('=') else {
        bail!("member {spec:?} must be IDENTITY=DESCRIPTOR");
    };
    Ok((identity.to_string(), wire(&load_descriptor(descriptor, token)?)))
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn connect(system: bool) -> Result<FacegateProxy<'static>> {
    let connection = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("cannot connect to D-Bus")?;
    FacegateProxy::new(&connection)
        .await
        .context("facegated is not reachable")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { descriptor } => {
            println!("{}", codec::encode(&load_descriptor(&descriptor, cli.token_input)?));
        }
        Commands::Decode { token } => {
            let descriptor = codec::decode(&token)?;
            println!("{}", serde_json::to_string(&descriptor)?);
        }
        command => {
            let proxy = connect(cli.system).await?;
            tracing::debug!(system = cli.system, "connected to facegated");
            run(&proxy, command, cli.token_input).await?;
        }
    }

    Ok(())
}

async fn run(proxy: &FacegateProxy<'_>, command: Commands, token: bool) -> Result<()> {
    match command {
        Commands::Register {
            display_name,
            handle,
        } => {
            let id = proxy.register(&display_name, &handle).await?;
            println!("{id}");
        }
        Commands::Enroll {
            identity,
            descriptor,
        } => {
            let probe = wire(&load_descriptor(&descriptor, token)?);
            print_json(&proxy.enroll(&identity, &probe).await?)?;
        }
        Commands::Authenticate {
            identity,
            descriptor,
            threshold,
        } => {
            let probe = wire(&load_descriptor(&descriptor, token)?);
            let raw = proxy
                .authenticate(&identity, &probe, threshold.unwrap_or(0.0))
                .await?;
            print_json(&raw)?;
        }
        Commands::Group { members, required } => {
            let members = members
                .iter()
                .map(|m| parse_member(m, token))
                .collect::<Result<Vec<_>>>()?;
            let raw = proxy
                .authenticate_group(&members, required.unwrap_or(0))
                .await?;
            print_json(&raw)?;
        }
        Commands::Match {
            descriptor,
            threshold,
            top,
        } => {
            let probe = wire(&load_descriptor(&descriptor, token)?);
            let raw = proxy
                .match_population(&probe, threshold.unwrap_or(0.0))
                .await?;
            let mut value: serde_json::Value = serde_json::from_str(&raw)?;
            if let (Some(n), Some(matches)) = (top, value["matches"].as_array_mut()) {
                matches.truncate(n);
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Compare { a, b } => {
            let a = wire(&load_descriptor(&a, token)?);
            let b = wire(&load_descriptor(&b, token)?);
            print_json(&proxy.compare(&a, &b).await?)?;
        }
        Commands::List => print_json(&proxy.list_identities().await?)?,
        Commands::Remove { identity } => {
            if proxy.remove_identity(&identity).await? {
                println!("Removed {identity}");
            } else {
                println!("No identity {identity}");
            }
        }
        Commands::Status => print_json(&proxy.status().await?)?,
        Commands::Encode { .. } | Commands::Decode { .. } => {
            bail!("encode and decode run without the daemon")
        }
    }
    Ok(())
}
