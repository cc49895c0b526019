/*!
Worker message protocol.

Every message is a JSON envelope `{"type": ..., "payload": ...}`. Requests
flow from the router to the background decode context, responses flow back.
Correlated requests carry a numeric `requestId` that the matching response
echoes; `init` and `ping` are answered without one.

Pixel buffers travel as base64 strings inside `frameData`.
*/

use crate::capabilities::{EngineCapabilities, ScanSettings};
use crate::error::{ErrorCode, Result, ScanError};
use crate::result::{CacheStats, DecodeOptions, DecodeOutcome, DecodeResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Request from the router to the background context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// One-shot initialization; answered by `ready` or `error`
    Init,
    /// Decode one frame
    Decode(DecodeRequest),
    /// Report deduplication cache statistics
    GetCacheStats(RequestRef),
    /// Drop every cache entry
    ClearCache(RequestRef),
    /// Liveness probe
    Ping(PingRequest),
    /// Report readable symbologies and current settings
    GetCapabilities(RequestRef),
    /// Apply new settings
    Configure(ConfigureRequest),
    /// Stop the background context
    Shutdown,
}

impl WorkerRequest {
    /// Serialize to a JSON envelope
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON envelope
    pub fn from_json(message: &str) -> Result<Self> {
        Ok(serde_json::from_str(message)?)
    }

    /// Correlation ID, for requests that carry one
    pub fn request_id(&self) -> Option<u64> {
        match self {
            WorkerRequest::Decode(req) => Some(req.request_id),
            WorkerRequest::GetCacheStats(req)
            | WorkerRequest::ClearCache(req)
            | WorkerRequest::GetCapabilities(req) => Some(req.request_id),
            WorkerRequest::Configure(req) => Some(req.request_id),
            WorkerRequest::Init | WorkerRequest::Ping(_) | WorkerRequest::Shutdown => None,
        }
    }

    /// Envelope type name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::Init => "init",
            WorkerRequest::Decode(_) => "decode",
            WorkerRequest::GetCacheStats(_) => "get_cache_stats",
            WorkerRequest::ClearCache(_) => "clear_cache",
            WorkerRequest::Ping(_) => "ping",
            WorkerRequest::GetCapabilities(_) => "get_capabilities",
            WorkerRequest::Configure(_) => "configure",
            WorkerRequest::Shutdown => "shutdown",
        }
    }
}

/// Payload carrying only a correlation ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRef {
    pub request_id: u64,
}

/// Empty ping payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {}

/// Decode request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    pub request_id: u64,
    #[serde(default, with = "base64_bytes")]
    pub frame_data: Bytes,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub options: DecodeOptions,
}

/// Settings request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub request_id: u64,
    #[serde(default)]
    pub settings: ScanSettings,
}

/// Response from the background context to the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// Initialization finished, decode calls are accepted
    Ready,
    /// Failure outside a typed response (initialization, unparseable message)
    Error(ErrorPayload),
    DecodeResult(DecodeResponse),
    CacheStats(CacheStatsResponse),
    CacheCleared(CacheClearedResponse),
    Pong(PongResponse),
    Capabilities(CapabilitiesResponse),
    Configured(ConfiguredResponse),
}

impl WorkerResponse {
    /// Serialize to a JSON envelope
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON envelope
    pub fn from_json(message: &str) -> Result<Self> {
        Ok(serde_json::from_str(message)?)
    }

    /// Correlation ID, for responses that carry one
    pub fn request_id(&self) -> Option<u64> {
        match self {
            WorkerResponse::DecodeResult(resp) => Some(resp.request_id),
            WorkerResponse::CacheStats(resp) => Some(resp.request_id),
            WorkerResponse::CacheCleared(resp) => Some(resp.request_id),
            WorkerResponse::Capabilities(resp) => Some(resp.request_id),
            WorkerResponse::Configured(resp) => Some(resp.request_id),
            WorkerResponse::Error(payload) => payload.request_id,
            WorkerResponse::Ready | WorkerResponse::Pong(_) => None,
        }
    }

    /// Envelope type name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerResponse::Ready => "ready",
            WorkerResponse::Error(_) => "error",
            WorkerResponse::DecodeResult(_) => "decode_result",
            WorkerResponse::CacheStats(_) => "cache_stats",
            WorkerResponse::CacheCleared(_) => "cache_cleared",
            WorkerResponse::Pong(_) => "pong",
            WorkerResponse::Capabilities(_) => "capabilities",
            WorkerResponse::Configured(_) => "configured",
        }
    }
}

/// Error payload.
///
/// Carries `requestId` when the failed request could be identified, so the
/// router can fail that caller instead of broadcasting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl ErrorPayload {
    /// Error not tied to any request
    pub fn uncorrelated(code: Option<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            request_id: None,
            code,
            message: message.into(),
        }
    }
}

/// Decode response payload.
///
/// `success: true` carries `result`; `success: false` carries either
/// `duplicate: true`, an `error` code, or neither (no code in the frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResponse {
    pub request_id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DecodeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    /// Time spent in the engine, milliseconds
    #[serde(default)]
    pub processing_time: f64,
}

impl DecodeResponse {
    /// Build the wire response for an engine outcome
    pub fn from_outcome(
        request_id: u64,
        outcome: std::result::Result<DecodeOutcome, ScanError>,
        processing_time: f64,
    ) -> Self {
        let mut response = Self {
            request_id,
            success: false,
            result: None,
            error: None,
            message: None,
            duplicate: None,
            processing_time,
        };

        match outcome {
            Ok(DecodeOutcome::Found(result)) => {
                response.success = true;
                response.result = Some(result);
            }
            Ok(DecodeOutcome::Duplicate) => response.duplicate = Some(true),
            Ok(DecodeOutcome::NotFound) => {}
            Err(e) => {
                response.error = Some(e.code());
                response.message = Some(e.to_string());
            }
        }

        response
    }

    /// Turn the wire response back into an outcome
    pub fn into_outcome(self) -> Result<DecodeOutcome> {
        if let Some(code) = self.error {
            return Err(ScanError::Worker {
                code,
                message: self.message.unwrap_or_else(|| code.to_string()),
            });
        }
        if self.success {
            return self
                .result
                .map(DecodeOutcome::Found)
                .ok_or_else(|| ScanError::request_failed("success response without result"));
        }
        if self.duplicate.unwrap_or(false) {
            return Ok(DecodeOutcome::Duplicate);
        }
        Ok(DecodeOutcome::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    pub request_id: u64,
    pub success: bool,
    pub stats: CacheStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheClearedResponse {
    pub request_id: u64,
    pub success: bool,
}

/// Liveness answer; `timestamp` is wall-clock milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongResponse {
    pub ready: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub request_id: u64,
    pub success: bool,
    pub capabilities: EngineCapabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredResponse {
    pub request_id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<EngineCapabilities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What could still be read from a request that failed to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalvagedRequest {
    /// Envelope `type`, if it was a string
    pub kind: Option<String>,
    pub request_id: u64,
}

impl SalvagedRequest {
    pub fn is_decode(&self) -> bool {
        self.kind.as_deref() == Some("decode")
    }
}

/// Best-effort extraction of `type` and `payload.requestId` from a message
/// that failed to parse. `None` when no request ID can be found.
pub fn salvage_request(message: &str) -> Option<SalvagedRequest> {
    let value: serde_json::Value = serde_json::from_str(message).ok()?;
    let request_id = value.get("payload")?.get("requestId")?.as_u64()?;
    let kind = value
        .get("type")
        .and_then(|kind| kind.as_str())
        .map(str::to_string);
    Some(SalvagedRequest { kind, request_id })
}

/// Serde adapter encoding pixel buffers as base64 strings
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Roi;
    use crate::symbology::{ScanPriority, Symbology};

    #[test]
    fn test_init_envelope_has_no_payload() {
        let json = WorkerRequest::Init.to_json().unwrap();
        assert_eq!(json, r#"{"type":"init"}"#);
        assert_eq!(WorkerRequest::from_json(&json).unwrap(), WorkerRequest::Init);

        let ready = WorkerResponse::from_json(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, WorkerResponse::Ready);
    }

    #[test]
    fn test_decode_request_envelope() {
        let request = WorkerRequest::Decode(DecodeRequest {
            request_id: 7,
            frame_data: Bytes::from_static(&[1, 2, 3, 4]),
            width: 1,
            height: 1,
            options: DecodeOptions {
                roi: Some(Roi::new(0, 0, 1, 1)),
                priority: Some(ScanPriority::Matrix),
            },
        });

        let json: serde_json::Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "decode");
        assert_eq!(json["payload"]["requestId"], 7);
        assert_eq!(json["payload"]["frameData"], "AQIDBA==");
        assert_eq!(json["payload"]["options"]["priority"], 2);

        let parsed = WorkerRequest::from_json(&json.to_string()).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(parsed.request_id(), Some(7));
    }

    #[test]
    fn test_ping_and_stats_envelopes() {
        let ping = WorkerRequest::Ping(PingRequest {}).to_json().unwrap();
        assert_eq!(ping, r#"{"type":"ping","payload":{}}"#);

        let stats = WorkerResponse::from_json(
            r#"{"type":"cache_stats","payload":{"requestId":3,"success":true,"stats":{"cacheSize":2,"cooldownMs":1500}}}"#,
        )
        .unwrap();
        assert_eq!(stats.request_id(), Some(3));
        match stats {
            WorkerResponse::CacheStats(resp) => assert_eq!(resp.stats.cooldown_ms, 1500),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_decode_response_outcomes() {
        let found = DecodeResponse::from_outcome(
            1,
            Ok(DecodeOutcome::Found(DecodeResult::new("A", Symbology::Code39, vec![], 0))),
            2.5,
        );
        assert!(found.success);
        assert!(matches!(found.clone().into_outcome(), Ok(DecodeOutcome::Found(_))));

        let duplicate = DecodeResponse::from_outcome(2, Ok(DecodeOutcome::Duplicate), 1.0);
        let json = serde_json::to_value(&duplicate).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["duplicate"], true);
        assert!(json.get("error").is_none());
        assert_eq!(duplicate.into_outcome().unwrap(), DecodeOutcome::Duplicate);

        let not_found = DecodeResponse::from_outcome(3, Ok(DecodeOutcome::NotFound), 1.0);
        let json = serde_json::to_value(&not_found).unwrap();
        assert!(json.get("duplicate").is_none());
        assert_eq!(not_found.into_outcome().unwrap(), DecodeOutcome::NotFound);

        let failed = DecodeResponse::from_outcome(4, Err(ScanError::MissingImageData), 0.1);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "MISSING_IMAGE_DATA");
        let err = failed.into_outcome().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingImageData);
    }

    #[test]
    fn test_salvage_request() {
        let broken = r#"{"type":"decode","payload":{"requestId":12,"width":"wide"}}"#;
        assert!(WorkerRequest::from_json(broken).is_err());
        let salvaged = salvage_request(broken).unwrap();
        assert_eq!(salvaged.request_id, 12);
        assert!(salvaged.is_decode());

        let stats = r#"{"type":"get_cache_stats","payload":{"requestId":"12"}}"#;
        assert_eq!(salvage_request(stats), None);
        let stats = r#"{"type":"get_cache_stats","payload":{"requestId":3,"extra":[}"#;
        assert_eq!(salvage_request(stats), None);
        let stats = r#"{"type":"get_cache_stat","payload":{"requestId":3}}"#;
        let salvaged = salvage_request(stats).unwrap();
        assert_eq!(salvaged.kind.as_deref(), Some("get_cache_stat"));
        assert!(!salvaged.is_decode());

        assert_eq!(salvage_request("not json"), None);
    }

    #[test]
    fn test_error_payload_request_id_on_wire() {
        let routed = WorkerResponse::Error(ErrorPayload {
            request_id: Some(9),
            code: Some(ErrorCode::InvalidRequest),
            message: "bad payload".to_string(),
        });
        let json = routed.to_json().unwrap();
        assert!(json.contains(r#""requestId":9"#));
        assert_eq!(routed.request_id(), Some(9));
        assert_eq!(WorkerResponse::from_json(&json).unwrap(), routed);

        let plain = WorkerResponse::Error(ErrorPayload::uncorrelated(None, "boom"));
        let json = plain.to_json().unwrap();
        assert!(!json.contains("requestId"));
        assert_eq!(plain.request_id(), None);
        let legacy = r#"{"type":"error","payload":{"message":"boom"}}"#;
        assert_eq!(WorkerResponse::from_json(legacy).unwrap(), plain);
    }
}
