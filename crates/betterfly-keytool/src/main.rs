//! Operator CLI for Betterfly deployments: generates a frame-cipher key and
//! sanity-checks the four JSON config files the server binary reads. Not
//! part of the wire protocol; never linked into `betterfly-server`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::RngCore;
use serde::Deserialize;

use betterfly_db::DbConfig;
use betterfly_push::PushConfig;
use betterfly_storage::StorageConfig;

#[derive(Parser)]
#[command(name = "betterfly-keytool", version, about = "Betterfly deployment helper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generates a random 32-byte ChaCha20-Poly1305 key for `config.json`'s
    /// `cipher_key_hex` field.
    GenKey,

    /// Parses every config file in a directory and reports the first error.
    CheckConfig {
        /// Directory containing config.json, database_config.json,
        /// cos_config.json, apns_config.json
        #[arg(default_value = "config")]
        dir: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct ListenConfig {
    #[allow(dead_code)]
    ip: String,
    #[allow(dead_code)]
    port: u16,
}

fn gen_key() {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    println!("{}", hex::encode(key));
}

fn check_one<T: for<'de> Deserialize<'de>>(path: &PathBuf) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str::<T>(&text).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(())
}

fn check_config(dir: PathBuf) {
    let checks: [(&str, fn(&PathBuf) -> Result<(), String>); 4] = [
        ("config.json", check_one::<ListenConfig>),
        ("database_config.json", check_one::<DbConfig>),
        ("cos_config.json", check_one::<StorageConfig>),
        ("apns_config.json", check_one::<PushConfig>),
    ];

    let mut failed = false;
    for (name, check) in checks {
        let path = dir.join(name);
        match check(&path) {
            Ok(()) => println!("ok   {name}"),
            Err(e) => {
                println!("FAIL {name}: {e}");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::GenKey => gen_key(),
        Command::CheckConfig { dir } => check_config(dir),
    }
}
