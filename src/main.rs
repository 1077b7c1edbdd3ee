use clap::{Parser, Subcommand};
use mini_ipfs::core::init;
use mini_ipfs::repo::{self, Repo};
use mini_ipfs::{Config, NodeLogger, Result, Session, setup_logging};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mini-ipfs")]
#[command(about = "Content-addressed storage with signed, mutable names")]
#[command(version)]
struct Cli {
    /// Repo directory (created on first use)
    #[arg(short, long, default_value = "./.mini-ipfs")]
    repo: PathBuf,
    /// Key file to publish names with (created if missing)
    #[arg(short, long)]
    key: Option<PathBuf>,
    /// Keep records in the local datastore only
    #[arg(long)]
    offline: bool,
    /// DHT port, overriding the repo config
    #[arg(short, long)]
    port: Option<u16>,
    /// Extra DHT bootstrap peer (host:port), may be repeated
    #[arg(short, long)]
    bootstrap: Vec<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repo without starting a node
    Init,
    /// Add a file and print its address
    Add { file: PathBuf },
    /// Print the content at a path
    Cat { path: String },
    /// Point the selected key's name at a path
    Publish { path: String },
    /// Print what a name points at
    Resolve { name: String },
    /// Run a node until interrupted
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let logger = NodeLogger::process("mini_ipfs");

    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        if repo::is_initialized(&cli.repo) {
            println!("Repo already initialized at {:?}", cli.repo);
        } else {
            init::init(&cli.repo, &logger).await?;
        }
        let repo = Repo::open(&cli.repo).await?;
        println!("peer identity: {}", repo.config().identity.peer_id);
        return Ok(());
    }

    let config = Config {
        repo_dir: cli.repo,
        key_file: cli.key.unwrap_or_default(),
        online: !cli.offline,
        listen_port: cli.port,
        bootstrap: cli.bootstrap,
    };
    let session = Session::start(config, logger).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Add { file } => {
            let cid = session.add_file(&file).await?;
            println!("added {} {:?}", cid, file);
        }
        Commands::Cat { path } => {
            let mut reader = session.get_file(&path).await?;
            let data = reader.read_to_end().await?;
            reader.close()?;
            print!("{}", String::from_utf8_lossy(&data));
        }
        Commands::Publish { path } => {
            let name = session.publish(&path).await?;
            println!("Published to {}: {}", name, path);
        }
        Commands::Resolve { name } => {
            println!("{}", session.resolve(&name).await?);
        }
        Commands::Daemon => {
            println!("Daemon is ready");
            println!("peer identity: {}", session.peer_id());
            if let Some(port) = session.listen_port() {
                println!("DHT listening on port {}", port);
            }

            tokio::signal::ctrl_c().await?;
            println!("Received interrupt signal, shutting down...");
        }
    }

    session.stop();
    Ok(())
}
