//! Profile Service - command line access to the CouchDB profile store.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use common::AppResult;
use domain::{ProfileAttributes, COUCH_ID};
use profile_service_lib::config::ProfileServiceConfig;
use profile_service_lib::service::ProfileStore;

#[derive(Parser)]
#[command(name = "profile-service")]
#[command(about = "Profile records stored in CouchDB")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and the lookup views
    Setup {
        /// Fields that get a by_<field> view (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Find profiles by identifier or by an indexed field
    Get {
        #[arg(long, default_value = COUCH_ID)]
        key: String,
        #[arg(long)]
        value: String,
        /// Fields to return (comma separated, all when omitted)
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
    },
    /// Store a new profile given as a JSON object
    Create { json: String },
    /// Merge a JSON object into the stored profile, creating it if missing
    Put { json: String },
    /// Delete a profile by identifier
    Delete { id: String },
}

fn parse_profile(json: &str) -> AppResult<ProfileAttributes> {
    Ok(serde_json::from_str(json)?)
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ProfileServiceConfig::from_env();

    if let Err(e) = run(cli.command, &config).await {
        tracing::error!("{} ({})", e, e.code());
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &ProfileServiceConfig) -> AppResult<()> {
    match command {
        Commands::Setup { fields } => {
            profile_service_lib::run_setup(config, &fields).await?;
        }
        Commands::Get { key, value, fields } => {
            let service = profile_service_lib::connect(config)?;
            let found = service.read(fields.as_deref(), &key, &value).await?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Commands::Create { json } => {
            let service = profile_service_lib::connect(config)?;
            service.insert(&parse_profile(&json)?).await?;
        }
        Commands::Put { json } => {
            let service = profile_service_lib::connect(config)?;
            service.update(&parse_profile(&json)?).await?;
        }
        Commands::Delete { id } => {
            let service = profile_service_lib::connect(config)?;
            service.delete_by_id(&id).await?;
        }
    }

    Ok(())
}
