//! ESDR Command-Line Binary
//!
//! Runs single operations against a repository kept in a data directory.
//! State is loaded at start and saved again after mutating commands.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use clap::{Args as ClapArgs, Parser, Subcommand};
use esdr_common::{ClientId, DeviceId, EsdrConfig, EsdrError, FeedId, Result, UserId};
use esdr_feeds::{ChannelSpec, Credential, Exposure, NewFeed, NewProduct};
use esdr_multifeed::{MultifeedClause, NewMultifeed};
use esdr_server::{handlers, AppState, ErrorResponse};
use esdr_timeseries::UploadRequest;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "esdr")]
#[command(about = "Environmental sensor data repository")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ESDR_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for snapshots (overrides the configuration)
    #[arg(short, long, env = "ESDR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Act as this user id
    #[arg(long, global = true)]
    user: Option<u64>,

    /// Present this feed API key
    #[arg(long, global = true, conflicts_with = "user")]
    key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage products
    #[command(subcommand)]
    Product(ProductCommand),
    /// Manage feeds
    #[command(subcommand)]
    Feed(FeedCommand),
    /// Upload a JSON file of rows ({"channel_names": [...], "data": [[t, v...]]})
    Upload {
        /// Feed id; omit to upload with the feed key alone
        #[arg(long)]
        feed: Option<u64>,
        file: PathBuf,
    },
    /// Print a feed's channel bounds
    Bounds { feed: u64 },
    /// Print one tile of a feed channel
    Tile(TileArgs),
    /// Export channels of a feed as CSV
    Export {
        feed: u64,
        /// Comma-separated channel names
        channels: String,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Manage multifeeds
    #[command(subcommand)]
    Multifeed(MultifeedCommand),
}

#[derive(Subcommand)]
enum ProductCommand {
    Create {
        name: String,
        #[arg(long)]
        pretty_name: Option<String>,
        #[arg(long, default_value = "")]
        vendor: String,
        /// Default channel as NAME or NAME:UNITS; repeatable
        #[arg(long = "channel")]
        channels: Vec<String>,
    },
    List,
}

#[derive(Subcommand)]
enum FeedCommand {
    Create {
        name: String,
        /// Product id or name
        #[arg(long)]
        product: String,
        #[arg(long, default_value_t = 0)]
        device: u64,
        #[arg(long, default_value = "outdoor")]
        exposure: String,
        #[arg(long)]
        public: bool,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
    },
    Info { feed: u64 },
    /// Query feeds with a selector such as "whereOr=productId=1,productId=2"
    Query { selector: String },
}

#[derive(ClapArgs)]
struct TileArgs {
    feed: u64,
    channel: String,
    level: String,
    offset: String,
}

#[derive(Subcommand)]
enum MultifeedCommand {
    /// Create from clauses given as SELECTOR|CHANNEL,CHANNEL
    Create {
        #[arg(long)]
        name: Option<String>,
        #[arg(required = true)]
        clauses: Vec<String>,
    },
    Show { multifeed: String },
    Feeds { multifeed: String },
    Tile {
        multifeed: String,
        level: String,
        offset: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let body = ErrorResponse::from(&e);
            match serde_json::to_string_pretty(&body) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => EsdrConfig::from_file(path)?,
        None => EsdrConfig::development(),
    }
    .with_data_dir(args.data_dir.clone());

    match config.storage.data_dir {
        Some(ref dir) => tracing::debug!("Persistence enabled, data directory: {}", dir.display()),
        None => tracing::warn!("No data directory specified, running in-memory only"),
    }

    let state = AppState::new(config)?;
    let credential = match (&args.key, args.user) {
        (Some(key), _) => Credential::FeedApiKey(key.clone()),
        (None, Some(user)) => {
            let token = state.tokens.issue(UserId(user), ClientId(0));
            Credential::AccessToken(token.access_token)
        }
        (None, None) => Credential::Anonymous,
    };

    let mutated = execute(&state, &credential, args.command).await?;
    if mutated {
        state.save_to_disk()?;
    }
    Ok(())
}

/// Run one command; returns whether state changed.
async fn execute(state: &AppState, credential: &Credential, command: Command) -> Result<bool> {
    match command {
        Command::Product(ProductCommand::Create {
            name,
            pretty_name,
            vendor,
            channels,
        }) => {
            let mut new = NewProduct::new(name);
            new.pretty_name = pretty_name;
            new.vendor = vendor;
            for channel in &channels {
                let (name, units) = channel.split_once(':').unwrap_or((channel.as_str(), ""));
                new = new.with_channel(name, ChannelSpec::new(name, units));
            }
            print_json(&handlers::create_product(state, credential, new)?)?;
            Ok(true)
        }
        Command::Product(ProductCommand::List) => {
            print_json(&state.directory.products())?;
            Ok(false)
        }
        Command::Feed(FeedCommand::Create {
            name,
            product,
            device,
            exposure,
            public,
            latitude,
            longitude,
        }) => {
            let product = state.directory.find_product(&product)?;
            let mut new = NewFeed::new(name, DeviceId(device), product.id).public(public);
            new.exposure = exposure.parse::<Exposure>()?;
            if let (Some(lat), Some(lon)) = (latitude, longitude) {
                new = new.with_location(lat, lon);
            }
            print_json(&handlers::create_feed(state, credential, new)?)?;
            Ok(true)
        }
        Command::Feed(FeedCommand::Info { feed }) => {
            print_json(&handlers::feed_info(state, FeedId(feed), credential)?)?;
            Ok(false)
        }
        Command::Feed(FeedCommand::Query { selector }) => {
            print_json(&handlers::query_feeds(state, &selector, credential)?)?;
            Ok(false)
        }
        Command::Upload { feed, file } => {
            let content = tokio::fs::read_to_string(&file).await?;
            let request: UploadRequest = serde_json::from_str(&content)
                .map_err(|e| EsdrError::validation("file", e.to_string()))?;
            let result = match feed {
                Some(feed) => handlers::upload(state, FeedId(feed), credential, &request)?,
                None => handlers::upload_with_feed_key(state, credential, &request)?.1,
            };
            print_json(&result)?;
            Ok(true)
        }
        Command::Bounds { feed } => {
            print_json(&handlers::channel_bounds(state, FeedId(feed), credential)?)?;
            Ok(false)
        }
        Command::Tile(tile) => {
            let tile = handlers::feed_tile(
                state,
                FeedId(tile.feed),
                &tile.channel,
                &tile.level,
                &tile.offset,
                credential,
            )?;
            print_json(&tile)?;
            Ok(false)
        }
        Command::Export {
            feed,
            channels,
            from,
            to,
        } => {
            let channels: Vec<String> = channels
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            let csv = handlers::export(
                state,
                FeedId(feed),
                &channels,
                from.as_deref(),
                to.as_deref(),
                credential,
            )?;
            let stdout = std::io::stdout();
            csv.write_to(&mut stdout.lock())?;
            Ok(false)
        }
        Command::Multifeed(MultifeedCommand::Create { name, clauses }) => {
            let spec = clauses
                .iter()
                .map(|clause| parse_clause(clause))
                .collect::<Result<Vec<_>>>()?;
            let mut new = NewMultifeed::new(spec);
            new.name = name;
            print_json(&handlers::create_multifeed(state, credential, new)?)?;
            Ok(true)
        }
        Command::Multifeed(MultifeedCommand::Show { multifeed }) => {
            print_json(&handlers::get_multifeed(state, &multifeed)?)?;
            Ok(false)
        }
        Command::Multifeed(MultifeedCommand::Feeds { multifeed }) => {
            print_json(&handlers::multifeed_feeds(state, &multifeed, credential)?)?;
            Ok(false)
        }
        Command::Multifeed(MultifeedCommand::Tile {
            multifeed,
            level,
            offset,
        }) => {
            let tile = handlers::multifeed_tile(state, &multifeed, &level, &offset, credential)?;
            print_json(&tile)?;
            Ok(false)
        }
    }
}

/// `SELECTOR|CHANNEL,CHANNEL`
fn parse_clause(clause: &str) -> Result<MultifeedClause> {
    let (feeds, channels) = clause.split_once('|').ok_or_else(|| {
        EsdrError::validation("clauses", format!("expected SELECTOR|CHANNELS, got '{}'", clause))
    })?;
    Ok(MultifeedClause::new(
        feeds.trim(),
        channels.split(',').map(str::trim).filter(|c| !c.is_empty()),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
