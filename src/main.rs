use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payment_app_finder::application::finder::PaymentAppFinder;
use payment_app_finder::config::FinderConfig;
use payment_app_finder::domain::app_store::PaymentContext;
use payment_app_finder::domain::ports::{DecoderRef, InventoryRef, TransportRef};
use payment_app_finder::infrastructure::directory::DirectoryTransport;
use payment_app_finder::infrastructure::json_decoder::JsonManifestDecoder;
use payment_app_finder::interfaces::json::inventory_reader::JsonFileInventory;
use payment_app_finder::interfaces::json::result_writer::ResultWriter;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payment method names or URLs requested by the merchant
    #[arg(required = true)]
    methods: Vec<String>,

    /// Installed-app inventory JSON file
    #[arg(long)]
    apps: PathBuf,

    /// Local manifest mirror laid out as <dir>/<host>/<path>
    #[arg(long, conflicts_with = "online", required_unless_present = "online")]
    manifests: Option<PathBuf>,

    /// Fetch manifests over HTTPS (requires the `http-transport` feature)
    #[arg(long)]
    online: bool,

    /// Finder configuration TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Permit plain http method and manifest URLs
    #[arg(long)]
    allow_http: bool,

    /// Package of the trusted web activity hosting the merchant; enables app-store billing
    #[arg(long, value_name = "PACKAGE")]
    twa: Option<String>,

    /// The merchant requests shipping address or payer contact details
    #[arg(long)]
    shipping_or_contact: bool,

    /// Log resolution details to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "payment_app_finder=debug"
    } else {
        "payment_app_finder=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "http-transport")]
fn online_transport(config: &FinderConfig) -> Result<TransportRef> {
    use payment_app_finder::infrastructure::http::HttpTransport;
    Ok(Arc::new(HttpTransport::new(config).into_diagnostic()?))
}

#[cfg(not(feature = "http-transport"))]
fn online_transport(_config: &FinderConfig) -> Result<TransportRef> {
    miette::bail!("--online requires building with the `http-transport` feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => FinderConfig::load(path).into_diagnostic()?,
        None => FinderConfig::default(),
    };
    let config = if cli.allow_http {
        config.with_allow_http(true)
    } else {
        config
    };

    let transport: TransportRef = match &cli.manifests {
        Some(dir) => Arc::new(DirectoryTransport::new(dir, config.max_manifest_bytes)),
        None => online_transport(&config)?,
    };
    let decoder: DecoderRef = Arc::new(JsonManifestDecoder::new(&config));
    let inventory: InventoryRef = Arc::new(JsonFileInventory::new(&cli.apps));

    let context = PaymentContext {
        twa_package: cli.twa,
        requests_shipping_or_contact: cli.shipping_or_contact,
    };

    let finder = PaymentAppFinder::new(transport, decoder, inventory, config);
    let apps = finder.find_apps_in(&cli.methods, &context).await;

    let stdout = io::stdout();
    let mut writer = ResultWriter::new(stdout.lock());
    writer.write_apps(apps).into_diagnostic()?;

    Ok(())
}
