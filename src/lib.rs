pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod notify;
pub mod store;
pub mod stream;
pub mod transcript;

use api::ApiClient;
use auth::AuthContext;
use cli::Args;
use config::ClientConfig;
use controller::ChatController;
use log::{ info, warn };
use notify::LogNotifier;
use std::error::Error;
use std::sync::Arc;
use store::InMemoryConversationStore;
use stream::SessionOutcome;
use tokio_util::sync::CancellationToken;

pub use error::ClientError;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = ClientConfig::from(&args);

    info!("--- Client Configuration ---");
    info!("API Base URL: {}", config.base_url);
    info!("Authenticated: {}", config.access_token.is_some());
    info!("Request Timeout: {:?}", config.request_timeout);
    info!("Pacing Interval: {:?}", config.pacing.tick_interval);
    info!("Pacing Chars Per Tick: {}", config.pacing.chars_per_tick);
    info!("Attached Documents: {}", args.documents.len());
    info!("-------------------------");

    let auth = AuthContext::new(config.access_token.clone());
    let api = ApiClient::new(config.clone(), auth.clone())?;
    if auth.token().is_some() {
        match api.fetch_account().await {
            Ok(profile) => {
                info!(
                    "Signed in as {}",
                    profile.email.as_deref().or(profile.id.as_deref()).unwrap_or("unknown user")
                );
            }
            Err(e) => warn!("Could not load account profile: {}", e),
        }
    }

    let store = Arc::new(InMemoryConversationStore::new());
    let controller = Arc::new(
        ChatController::new(api, store.clone(), Arc::new(LogNotifier), config.pacing)
    );

    let conversation_id = match args.conversation_id.clone().filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => controller.create_conversation(args.title.as_deref()).await?,
    };
    info!("Conversation: {}", conversation_id);

    let done = CancellationToken::new();
    let printer = tokio::spawn(
        transcript::follow(store.clone(), conversation_id.clone(), done.clone())
    );

    let interrupt = {
        let controller = controller.clone();
        let conversation_id = conversation_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling generation");
                controller.cancel_generation(&conversation_id);
            }
        })
    };

    let outcome = controller.send_message(Some(&conversation_id), &args.message, &args.documents).await;
    interrupt.abort();
    done.cancel();
    if let Ok(Err(e)) = printer.await {
        warn!("Failed to print transcript: {}", e);
    }

    match outcome? {
        Some(SessionOutcome::Completed { message_id }) => {
            info!("Reply stored as {}", message_id);
            Ok(())
        }
        Some(SessionOutcome::Cancelled) => Ok(()),
        Some(SessionOutcome::Failed { message }) => Err(message.into()),
        None => Err("Message must not be empty".into()),
    }
}
