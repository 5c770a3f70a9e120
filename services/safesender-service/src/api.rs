//! HTTP routes for the SafeSender relay

use actix_web::error::JsonPayloadError;
use actix_web::{web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose::STANDARD, Engine};
use safesender_relay::{Envelope, EnvelopePayload, PublicKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;
use crate::AppState;

/// Algorithm tag assumed when a client leaves it out (WebCrypto hybrid scheme)
const DEFAULT_ALGORITHM: &str = "RSA-OAEP+AES-GCM";

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/register-key", web::post().to(register_key))
            .route("/get-public-key/{user_id}", web::get().to(get_public_key))
            .route("/send-message", web::post().to(send_message))
            .route("/get-messages/{user_id}", web::get().to(get_messages))
            .route("/mark-read", web::post().to(mark_read))
            .route("/status", web::get().to(status)),
    )
    .route("/health", web::get().to(health));
}

/// JSON extractor settings: body limit plus errors in the API's own shape
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            let err = match err {
                JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
                    ServiceError::PayloadTooLarge("Request body too large".to_string())
                }
                other => ServiceError::BadRequest(format!("Invalid JSON body: {}", other)),
            };
            err.into()
        })
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

impl SuccessResponse {
    fn ok() -> Self {
        Self { success: true }
    }
}

fn missing_fields() -> ServiceError {
    ServiceError::BadRequest("Missing required fields".to_string())
}

/// Treat `""` like an absent field, as browsers tend to send both
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Register key request
#[derive(Debug, Deserialize)]
pub struct RegisterKeyRequest {
    pub user_id: Option<String>,
    /// Public key in JWK form; kept verbatim
    pub public_key: Option<serde_json::Value>,
}

async fn register_key(
    state: web::Data<AppState>,
    req: web::Json<RegisterKeyRequest>,
) -> Result<HttpResponse, ServiceError> {
    let req = req.into_inner();
    let user_id = non_empty(req.user_id).ok_or_else(missing_fields)?;
    let public_key = req
        .public_key
        .filter(|key| !is_blank(key))
        .ok_or_else(missing_fields)?;

    let bytes = serde_json::to_vec(&public_key)?;
    state.relay.register_key(&user_id, PublicKey::new(bytes))?;

    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Public key response
#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub success: bool,
    pub public_key: serde_json::Value,
}

async fn get_public_key(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let user_id = path.into_inner();

    let key = state
        .relay
        .get_public_key(&user_id)
        .ok_or(ServiceError::NotFound(
            "User not found or has not registered a public key",
        ))?;
    let public_key = serde_json::from_slice(key.as_bytes())?;

    Ok(HttpResponse::Ok().json(PublicKeyResponse {
        success: true,
        public_key,
    }))
}

/// Client-side hybrid encryption output, base64 encoded
#[derive(Debug, Deserialize, Serialize)]
pub struct EncryptedData {
    pub encrypted_message: String,
    pub iv: String,
    pub encrypted_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

impl EncryptedData {
    fn into_payload(self) -> Result<EnvelopePayload, ServiceError> {
        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|_| ServiceError::BadRequest(format!("Invalid base64 in {}", field)))
        };

        Ok(EnvelopePayload {
            ciphertext: decode("encrypted_message", &self.encrypted_message)?,
            wrapped_key: decode("encrypted_key", &self.encrypted_key)?,
            iv: decode("iv", &self.iv)?,
            algorithm: non_empty(self.algorithm).unwrap_or_else(|| DEFAULT_ALGORITHM.to_string()),
        })
    }

    fn from_payload(payload: &EnvelopePayload) -> Self {
        Self {
            encrypted_message: STANDARD.encode(&payload.ciphertext),
            iv: STANDARD.encode(&payload.iv),
            encrypted_key: STANDARD.encode(&payload.wrapped_key),
            algorithm: Some(payload.algorithm.clone()),
        }
    }
}

/// Send message request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: Option<String>,
    pub encrypted_data: Option<EncryptedData>,
    /// Optional; omitted for fully anonymous sends
    pub sender_id: Option<String>,
}

/// Send message response
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: String,
}

async fn send_message(
    state: web::Data<AppState>,
    http: HttpRequest,
    req: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ServiceError> {
    let req = req.into_inner();
    let recipient_id = non_empty(req.recipient_id).ok_or_else(missing_fields)?;
    let payload = req.encrypted_data.ok_or_else(missing_fields)?.into_payload()?;
    let sender_id = non_empty(req.sender_id);

    // the address only keys the rate limiter; it is never logged or stored with the message
    let connection_key = http.peer_addr().map(|addr| addr.ip().to_string());

    let message_id = state.relay.submit_envelope(
        &recipient_id,
        sender_id.as_deref(),
        payload,
        connection_key.as_deref(),
    )?;

    Ok(HttpResponse::Ok().json(SendMessageResponse {
        success: true,
        message_id: message_id.to_string(),
    }))
}

/// Pending message as returned to its recipient
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    pub encrypted_data: EncryptedData,
    pub timestamp: String,
    pub sender_id: Option<String>,
}

impl From<&Envelope> for MessageView {
    fn from(envelope: &Envelope) -> Self {
        Self {
            id: envelope.id.to_string(),
            encrypted_data: EncryptedData::from_payload(&envelope.payload),
            timestamp: envelope.created_at.to_rfc3339(),
            sender_id: envelope.sender.as_ref().map(|s| s.to_string()),
        }
    }
}

/// Messages response
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<MessageView>,
}

async fn get_messages(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let user_id = path.into_inner();
    let messages: Vec<MessageView> = state
        .relay
        .list_pending(&user_id)
        .iter()
        .map(MessageView::from)
        .collect();

    debug!("Listing {} pending messages", messages.len());

    HttpResponse::Ok().json(MessagesResponse {
        success: true,
        messages,
    })
}

/// Mark read request
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub user_id: Option<String>,
    pub message_id: Option<String>,
}

async fn mark_read(
    state: web::Data<AppState>,
    req: web::Json<MarkReadRequest>,
) -> Result<HttpResponse, ServiceError> {
    let req = req.into_inner();
    let user_id = non_empty(req.user_id).ok_or_else(missing_fields)?;
    let message_id = non_empty(req.message_id).ok_or_else(missing_fields)?;

    state.relay.mark_delivered(&message_id, &user_id)?;

    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub users_with_keys: usize,
    pub total_messages: usize,
    pub message_lifetime_minutes: u64,
}

async fn status(state: web::Data<AppState>) -> HttpResponse {
    let status = state.relay.status();
    HttpResponse::Ok().json(StatusResponse {
        status: "active".to_string(),
        users_with_keys: status.users_with_keys,
        total_messages: status.total_messages,
        message_lifetime_minutes: status.message_lifetime_minutes,
    })
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "safesender".to_string(),
    })
}
