mod config;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use betterfly_core::Server;
use betterfly_proto::{ChaCha20Poly1305Cipher, FrameCipher, Identity};
use betterfly_db::DbGateway;
use betterfly_push::PushClient;
use betterfly_storage::ObjectStoreGateway;
use tracing::{error, info};

fn build_cipher(hex_key: &Option<String>) -> Arc<dyn FrameCipher> {
    match hex_key {
        None => Arc::new(Identity),
        Some(hex_key) => match hex::decode(hex_key) {
            Ok(bytes) if bytes.len() == 32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                Arc::new(ChaCha20Poly1305Cipher::new(&key))
            }
            Ok(_) => {
                error!("cipher_key_hex must decode to exactly 32 bytes, falling back to no cipher");
                Arc::new(Identity)
            }
            Err(e) => {
                error!(error = %e, "cipher_key_hex is not valid hex, falling back to no cipher");
                Arc::new(Identity)
            }
        },
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config_dir = config::config_dir();
    let cfg = config::load(&config_dir)?;
    info!(dir = %config_dir.display(), "loaded configuration");

    let listen_addr = format!("{}:{}", cfg.listen.ip, cfg.listen.port).parse()?;
    let cipher = build_cipher(&cfg.listen.cipher_key_hex);

    let db = DbGateway::connect(&cfg.db)?;
    let storage = ObjectStoreGateway::connect(&cfg.storage)?;
    let push = PushClient::connect(&cfg.push)?;

    let server = Server::new(listen_addr, db, storage, push, cipher);

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        shutdown.request_shutdown();
    })?;

    info!(%listen_addr, "starting server");
    server.run()?;
    info!("shut down cleanly");
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
