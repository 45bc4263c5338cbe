use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Backend Args ---
    /// Base URL of the chat backend (e.g., http://localhost:8000)
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:8000")]
    pub api_base_url: String,

    /// Bearer token for authenticated calls. Omit for anonymous access.
    #[arg(long, env = "ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Timeout in milliseconds for plain (non-streaming) requests.
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "15000")]
    pub request_timeout_ms: u64,

    // --- Pacing Args ---
    /// Interval in milliseconds between reveals of streamed text.
    #[arg(long, env = "PACING_INTERVAL_MS", default_value = "20")]
    pub pacing_interval_ms: u64,

    /// Number of characters revealed per pacing tick.
    #[arg(long, env = "PACING_CHARS_PER_TICK", default_value = "3")]
    pub pacing_chars_per_tick: usize,

    // --- Conversation Args ---
    /// Conversation to post into. A new conversation is created when absent.
    #[arg(long, env = "CONVERSATION_ID")]
    pub conversation_id: Option<String>,

    /// Title used when a new conversation has to be created.
    #[arg(long)]
    pub title: Option<String>,

    /// Document id to attach to the message. Repeat for several documents.
    #[arg(long = "document", short = 'd')]
    pub documents: Vec<String>,

    /// Message text to send.
    pub message: String,
}
