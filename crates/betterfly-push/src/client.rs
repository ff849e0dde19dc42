//! APNs push gateway: JWT-signed HTTP/2 notifications (`spec.md` C6).

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::config::PushConfig;
use crate::error::PushError;

const PROD_URL: &str = "https://api.push.apple.com";
const SANDBOX_URL: &str = "https://api.sandbox.push.apple.com";

/// The three-way result `spec.md` C6 asks for. Apple's real status codes
/// carry this distinction directly: `BadDeviceToken`/`Unregistered` mean
/// the token itself is dead and should be pruned, anything else
/// non-2xx (or a transport failure) is worth retrying later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Ok,
    InvalidToken,
    Transient,
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    iat: u64,
}

#[derive(Serialize)]
struct Alert {
    title: String,
    body: String,
}

#[derive(Serialize)]
struct Aps {
    alert: Alert,
    sound: &'static str,
    badge: u32,
}

#[derive(Serialize)]
struct NotificationPayload {
    aps: Aps,
}

fn notification_payload(user_name: &str, msg: &str) -> NotificationPayload {
    NotificationPayload {
        aps: Aps {
            alert: Alert {
                title: user_name.to_string(),
                body: msg.to_string(),
            },
            sound: "default",
            badge: 1,
        },
    }
}

pub struct PushClient {
    team_id: String,
    key_id: String,
    bundle_id: String,
    signing_key_pem: String,
    apns_url: &'static str,
    http: reqwest::Client,
    rt: tokio::runtime::Runtime,
}

impl PushClient {
    pub fn connect(config: &PushConfig) -> Result<PushClient, PushError> {
        let signing_key_pem = fs::read_to_string(&config.key_path).map_err(|e| PushError::KeyFile {
            path: config.key_path.clone(),
            source: e,
        })?;

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("betterfly-push")
            .enable_all()
            .build()
            .map_err(|e| PushError::KeyFile {
                path: config.key_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        let http = reqwest::Client::builder()
            .http2_prior_knowledge()
            .build()?;

        Ok(PushClient {
            team_id: config.team_id.clone(),
            key_id: config.key_id.clone(),
            bundle_id: config.bundle_id.clone(),
            signing_key_pem,
            apns_url: if config.use_sandbox { SANDBOX_URL } else { PROD_URL },
            http,
            rt,
        })
    }

    fn generate_jwt(&self) -> Result<String, PushError> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs();

        let key = EncodingKey::from_ec_pem(self.signing_key_pem.as_bytes())?;
        let token = jsonwebtoken::encode(
            &header,
            &Claims {
                iss: self.team_id.clone(),
                iat,
            },
            &key,
        )?;
        Ok(token)
    }

    #[instrument(skip(self, user_name, msg))]
    pub fn send_notification(
        &self,
        device_token: &str,
        user_name: &str,
        msg: &str,
    ) -> Result<PushOutcome, PushError> {
        let jwt = self.generate_jwt()?;
        let payload = notification_payload(user_name, msg);
        let url = format!("{}/3/device/{}", self.apns_url, device_token);

        self.rt.block_on(async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(jwt)
                .header("apns-topic", &self.bundle_id)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(PushOutcome::Ok);
            }

            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "APNs rejected notification");

            Ok(match status {
                StatusCode::BAD_REQUEST | StatusCode::GONE | StatusCode::FORBIDDEN => {
                    PushOutcome::InvalidToken
                }
                _ => PushOutcome::Transient,
            })
        })
    }
}
