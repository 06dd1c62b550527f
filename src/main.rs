mod es;
mod highlight;
mod query;

pub const USER_AGENT: &str = concat!("parlascope/", env!("CARGO_PKG_VERSION"));

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tracing::{info, warn};

use es::client::EsClient;
use highlight::{DEFAULT_CHUNK_SIZE, HighlightRequest, HighlightStream};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Streams transcript and PDF highlight regions for a meeting search as
/// newline-delimited JSON on stdout. End of stream signals completion.
///
/// Backend configuration via environment variables:
/// - `ELASTICSEARCH_HOSTS`: comma-separated hosts (first one is used)
/// - `WORDS_INDEX_NAME` / `SENTENCES_INDEX_NAME`: index names
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Meeting to search in
    #[arg(long)]
    meeting: String,

    /// Query text, e.g. `"foo bar" baz OR qux`
    #[arg(long, default_value = "")]
    words: String,

    /// Fuzzy speaker name filter
    #[arg(long)]
    speaker: Option<String>,

    /// Translation language to search in; omit for original-language mode
    #[arg(long)]
    lang: Option<String>,

    /// Allow fuzzy word matching
    #[arg(long)]
    loose: bool,

    /// Hits fetched from each index per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parlascope=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;
    let backend = EsClient::from_env(http)?;

    let request = HighlightRequest {
        meeting_id: cli.meeting,
        words_query: cli.words,
        speaker: cli.speaker,
        lang: cli.lang,
        loose_search: cli.loose,
        chunk_size: cli.chunk_size,
    };

    let mut stream = match HighlightStream::open(&backend, request).await {
        Ok(stream) => stream,
        Err(e) => {
            // Fatal before any data was delivered: a single error chunk,
            // then the stream closes.
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            return Err(e.into());
        }
    };

    let stdout = std::io::stdout();
    while let Some(chunk) = stream.next_chunk().await {
        let line = serde_json::to_string(&chunk)?;
        let mut out = stdout.lock();
        if writeln!(out, "{line}").and_then(|()| out.flush()).is_err() {
            // Consumer went away: release both cursors before any further
            // backend work is issued.
            warn!("output stream closed by consumer; stopping");
            break;
        }
    }
    stream.close().await;
    info!("highlight stream complete");
    Ok(())
}
