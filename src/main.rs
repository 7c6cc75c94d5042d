use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recipe_api::{
    accounts::create_superuser, context::AppContext, cryptography::generate_secret,
    form::UserPayload, jwt::SessionKeys, memory::MemoryStore, postgres::PgStore, routes::routes,
    store::Store, Config, MediaStorage,
};

#[derive(Parser)]
#[command(name = "recipe-api")]
#[command(author, version, about = "Recipe storage HTTP API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Keep everything in memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },
    /// Create an account with staff and superuser rights
    CreateSuperuser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        name: Option<String>,
    },
    /// Print a random value for SECRET_KEY
    GenerateSecret {
        #[arg(long, default_value_t = 50)]
        length: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recipe_api=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { memory } => serve(load_config()?, memory).await,
        Commands::CreateSuperuser {
            email,
            password,
            name,
        } => {
            let store = connect(&load_config()?).await?;
            let payload = UserPayload {
                email: Some(email),
                password: Some(password),
                name,
            };
            let user = create_superuser(&store, &payload)
                .await
                .context("Failed to create superuser")?;
            log::info!("Created superuser {} ({})", user.email, user.id);
            Ok(())
        }
        Commands::GenerateSecret { length } => {
            println!("{}", generate_secret(length));
            Ok(())
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    Config::from_env().context("Invalid configuration")
}

async fn connect(config: &Config) -> anyhow::Result<PgStore> {
    PgStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to the database")
}

async fn serve(config: Config, memory: bool) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = if memory {
        log::warn!("Using the in-memory store, data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(connect(&config).await?)
    };

    let keys = SessionKeys::new(config.secret_key.as_bytes(), config.token_lifetime())?;
    let media = MediaStorage::new(config.media_root.clone(), config.max_image_bytes);
    tokio::fs::create_dir_all(media.root())
        .await
        .with_context(|| format!("Failed to create {}", media.root().display()))?;

    let ctx = AppContext::new(store, keys, media);
    let address = config.address();
    log::info!("Listening on {address}");

    warp::serve(routes(ctx)).run(address).await;
    Ok(())
}
