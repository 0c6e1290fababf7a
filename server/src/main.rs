use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use relaychat_server::config::config_path;
use relaychat_server::credentials::hash_password;
use relaychat_server::{AvatarStore, ChatServer, ChatState, MemoryStore, ServerConfig, VoiceRelayServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let first = args.next();

    if first.as_deref() == Some("hash") {
        let Some(password) = args.next() else {
            eprintln!("usage: relaychat-server hash <password>");
            return ExitCode::FAILURE;
        };
        println!("{}", hash_password(&password));
        return ExitCode::SUCCESS;
    }

    let path = config_path(first);
    let config = match ServerConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Loaded {} with {} channels and {} users",
        path.display(),
        config.channels.len(),
        config.users.len()
    );

    let store = Arc::new(MemoryStore::new(&config.channels, &config.users));
    let state = ChatState::new(store, AvatarStore::new(config.images_path())).with_session_queue(config.session_queue);
    let chat = ChatServer::new(state);
    let relay = VoiceRelayServer::with_queue_frames(config.voice_echo, config.voice_queue_frames);

    let text_addr = config.text_addr();
    let voice_addr = config.voice_addr();
    if let Err(e) = tokio::try_join!(chat.run(&text_addr), relay.run(&voice_addr)) {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
