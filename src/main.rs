use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use outreach_assist::api::{self, AppState};
use outreach_assist::config::{AgencyConfig, AppConfig, ExtractionMode, GatewayConfig, MonitorConfig};
use outreach_assist::content::ContentGenerator;
use outreach_assist::gateway::{OutboundGateway, SenderConfigStore};
use outreach_assist::llm::{LlmConfig, create_provider};
use outreach_assist::mail::ImapConnector;
use outreach_assist::monitor::{
    ConversationExtractor, HeaderConversationExtractor, LlmConversationExtractor, ReplyMonitor,
};
use outreach_assist::scheduler::{ReplyScheduler, spawn_reply_poller};
use outreach_assist::store::{LeadStore, LibSqlLeadStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let app_config = AppConfig::from_env()?;
    let monitor_config = MonitorConfig::from_env()?;
    let gateway_config = GatewayConfig::from_env();
    let agency = AgencyConfig::from_env();
    let llm_config = LlmConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });

    // ── Lead store ───────────────────────────────────────────────────────
    let store: Arc<dyn LeadStore> = Arc::new(
        LibSqlLeadStore::new_local(&app_config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    app_config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    // ── Senders & gateway ────────────────────────────────────────────────
    let senders = Arc::new(
        SenderConfigStore::load(&app_config.senders_file).with_context(|| {
            format!("loading sender configs from {}", app_config.senders_file.display())
        })?,
    );
    let gateway = Arc::new(OutboundGateway::new(Arc::clone(&senders), gateway_config));
    let mailboxes = senders.mailboxes(&monitor_config.imap_host, monitor_config.imap_port);

    eprintln!("📬 Outreach Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   API: http://{}", app_config.bind);
    eprintln!("   Database: {}", app_config.db_path.display());
    eprintln!(
        "   Mailboxes: {} on {}:{}",
        mailboxes.len(),
        monitor_config.imap_host,
        monitor_config.imap_port
    );
    for mailbox in &mailboxes {
        eprintln!("     - {}", mailbox.address);
    }
    eprintln!(
        "   Reply poll: every {}s ({:?} extraction)\n",
        monitor_config.poll_interval.as_secs(),
        monitor_config.extraction
    );

    // ── LLM & content ────────────────────────────────────────────────────
    let llm = create_provider(&llm_config)?;
    let generator = Arc::new(ContentGenerator::new(Arc::clone(&llm), agency.clone()));

    // ── Reply monitoring ─────────────────────────────────────────────────
    let extractor: Arc<dyn ConversationExtractor> = match monitor_config.extraction {
        ExtractionMode::Llm => Arc::new(LlmConversationExtractor::new(Arc::clone(&llm))),
        ExtractionMode::Headers => Arc::new(HeaderConversationExtractor),
    };
    let monitor = Arc::new(ReplyMonitor::new(
        Arc::new(ImapConnector),
        extractor,
        Arc::clone(&store),
    ));
    let scheduler = Arc::new(ReplyScheduler::new(
        monitor,
        Arc::clone(&senders),
        Arc::clone(&store),
        monitor_config,
    ));
    let (poller_handle, poller_shutdown) = spawn_reply_poller(Arc::clone(&scheduler));

    // ── HTTP API ─────────────────────────────────────────────────────────
    let state = AppState {
        store,
        generator,
        gateway,
        senders,
        scheduler,
        agency,
    };
    let app = api::routes(state, &app_config.cors_origin);

    let listener = tokio::net::TcpListener::bind(app_config.bind)
        .await
        .with_context(|| format!("binding {}", app_config.bind))?;
    tracing::info!(addr = %app_config.bind, "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown requested");
        })
        .await?;

    poller_shutdown.store(true, Ordering::Relaxed);
    poller_handle.abort();
    Ok(())
}
