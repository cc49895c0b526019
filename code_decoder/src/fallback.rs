/*!
HTTP fallback boundary.

Used when no background worker is available: a JSON request carrying the
frame is validated, decoded synchronously, and answered with an HTTP status
and a JSON body. Transport is the caller's business; this module only maps
requests to responses.

| Outcome            | Status |
|--------------------|--------|
| code found         | 200    |
| duplicate          | 200 (`duplicate: true`) |
| nothing found      | 422    |
| validation failure | 400    |
| other failure      | 500    |
*/

use crate::engine::ScanEngine;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{DecodeOptions, DecodeOutcome, Frame, Result, ScanError};
use tracing::warn;

/// Fallback decode request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    /// Base64 RGBA pixels
    #[serde(default)]
    pub image_data: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub options: DecodeOptions,
}

/// Status code and JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResponse {
    pub status: u16,
    pub body: Value,
}

impl FallbackResponse {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn from_error(err: &ScanError) -> Self {
        let status = if err.is_validation() { 400 } else { 500 };
        Self::new(
            status,
            json!({
                "success": false,
                "error": err.code(),
                "message": err.to_string(),
            }),
        )
    }
}

fn dimension(value: i64, name: &str) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| ScanError::invalid_image(format!("{} must be positive, got {}", name, value)))
}

impl FallbackRequest {
    /// Validate and turn the request into a frame
    pub fn to_frame(&self) -> Result<Frame> {
        let width = dimension(self.width, "width")?;
        let height = dimension(self.height, "height")?;
        if self.image_data.is_empty() {
            return Err(ScanError::MissingImageData);
        }

        let data = STANDARD
            .decode(self.image_data.as_bytes())
            .map_err(|e| ScanError::invalid_request(format!("imageData is not base64: {}", e)))?;

        let frame = Frame::new(data, width, height);
        frame.validate()?;
        Ok(frame)
    }
}

/// Decode a parsed request
pub fn handle(engine: &ScanEngine, request: &FallbackRequest) -> FallbackResponse {
    let outcome = request
        .to_frame()
        .and_then(|frame| engine.decode_frame(&frame, &request.options));

    match outcome {
        Ok(DecodeOutcome::Found(result)) => {
            FallbackResponse::new(200, json!({ "success": true, "result": result }))
        }
        Ok(DecodeOutcome::Duplicate) => {
            FallbackResponse::new(200, json!({ "success": false, "duplicate": true }))
        }
        Ok(DecodeOutcome::NotFound) => FallbackResponse::new(
            422,
            json!({ "success": false, "message": "No code found in frame" }),
        ),
        Err(err) => {
            if !err.is_validation() {
                warn!("⚠️ Fallback decode failed: {}", err);
            }
            FallbackResponse::from_error(&err)
        }
    }
}

/// Decode a raw JSON request body
pub fn handle_json(engine: &ScanEngine, body: &str) -> FallbackResponse {
    match serde_json::from_str::<FallbackRequest>(body) {
        Ok(request) => handle(engine, &request),
        Err(err) => FallbackResponse::from_error(&ScanError::from(err)),
    }
}
