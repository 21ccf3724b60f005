use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nexora_core::bootstrap::{DefaultService, build_service, resolve_config_path};
use nexora_core::vault::EnvVaultProvider;
use nexora_core::{AskRequest, Config};
use nexora_gateway::GatewayServer;
use nexora_memory::{SessionId, SourceType, TenantId};

#[derive(Parser)]
#[command(name = "nexora", version, about = "Multi-tenant document question answering")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve,
    /// Chunk, embed and store a file as one source.
    Ingest {
        #[arg(long)]
        tenant: String,
        /// Defaults to the file path.
        #[arg(long)]
        source_url: Option<String>,
        #[arg(long, value_parser = parse_source_type)]
        source_type: Option<SourceType>,
        file: PathBuf,
    },
    /// Ask a question against a tenant's corpus.
    Ask {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        session: Option<String>,
        question: String,
    },
    /// Print the messages of a session.
    History {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        session: String,
    },
    DeleteSource {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        source_url: String,
    },
    /// Remove every chunk and session of a tenant.
    Purge {
        #[arg(long)]
        tenant: String,
    },
    Stats {
        #[arg(long)]
        tenant: String,
    },
}

fn parse_source_type(s: &str) -> Result<SourceType, String> {
    s.parse()
        .map_err(|_| format!("unknown source type '{s}' (web, pdf, docx, text, upload)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.resolve_secrets(&EnvVaultProvider).await?;

    let service = Arc::new(build_service(&config).await?);

    match cli.command {
        Command::Serve => serve(service, &config).await,
        Command::Ingest {
            tenant,
            source_url,
            source_type,
            file,
        } => ingest(&service, &tenant, source_url.as_deref(), source_type, &file).await,
        Command::Ask {
            tenant,
            session,
            question,
        } => ask(&service, &tenant, session, question).await,
        Command::History { tenant, session } => {
            let messages = service
                .get_history(&TenantId::new(tenant)?, &SessionId::parse(session)?)
                .await?;
            for message in messages {
                println!("[{}] {}", message.role.as_str(), message.content);
                if !message.sources.is_empty() {
                    println!("  sources: {}", message.sources.join(", "));
                }
            }
            Ok(())
        }
        Command::DeleteSource { tenant, source_url } => {
            let deleted = service
                .delete_source(&TenantId::new(tenant)?, &source_url)
                .await?;
            println!("deleted {deleted} chunks");
            Ok(())
        }
        Command::Purge { tenant } => {
            let report = service.purge_tenant(&TenantId::new(tenant)?).await?;
            println!(
                "deleted {} chunks and {} sessions",
                report.chunks_deleted, report.sessions_deleted
            );
            Ok(())
        }
        Command::Stats { tenant } => {
            let stats = service.stats(&TenantId::new(tenant)?).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

async fn serve(service: Arc<DefaultService>, config: &Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let gateway = &config.gateway;
    let server = GatewayServer::new(&gateway.bind, gateway.port, Arc::clone(&service), shutdown_rx)
        .with_auth(gateway.auth_token.clone())
        .with_rate_limit(gateway.rate_limit)
        .with_max_body_size(gateway.max_body_size);

    let handle = tokio::spawn(server.serve());
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    service.jobs().cancel_all();
    let _ = shutdown_tx.send(true);
    handle.await.context("gateway task panicked")??;
    Ok(())
}

async fn ingest(
    service: &DefaultService,
    tenant: &str,
    source_url: Option<&str>,
    source_type: Option<SourceType>,
    file: &Path,
) -> anyhow::Result<()> {
    let tenant = TenantId::new(tenant)?;
    let stored = service
        .ingest_file(&tenant, file, source_url, source_type)
        .await?;
    println!("stored {stored} chunks from {}", file.display());
    Ok(())
}

async fn ask(
    service: &DefaultService,
    tenant: &str,
    session: Option<String>,
    question: String,
) -> anyhow::Result<()> {
    let mut request = AskRequest::new(TenantId::new(tenant)?, question);
    if let Some(session) = session {
        request = request.in_session(SessionId::parse(session)?);
    }
    let answer = service.ask(request).await?;
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!("\nsources:");
        for source in &answer.sources {
            println!("  - {source}");
        }
    }
    println!("\nsession: {}", answer.session_id);
    Ok(())
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
