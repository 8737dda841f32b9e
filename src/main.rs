/// Key resolver service
///
/// Serves address, routing and organisation records over HTTP, backed by
/// SQLite, PostgreSQL or Redis.
use key_resolver::{
    config::{ServerConfig, DEFAULT_LOG_FILTER},
    context::AppContext,
    server,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    __                                   __
   / /_____  __  __   ________  _______  / /   _____  _____
  / //_/ _ \/ / / /  / ___/ _ \/ ___/ / / / | / / _ \/ ___/
 / ,< /  __/ /_/ /  / /  /  __(__  ) /_/ /| |/ /  __/ /
/_/|_|\___/\__, /  /_/   \___/____/\____/ |___/\___/_/
          /____/
        Key Resolver v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
