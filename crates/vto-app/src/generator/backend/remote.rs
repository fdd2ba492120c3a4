use std::io::Cursor;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use vto_core::error::{BackendErrorKind, BackendInvocationError, ConfigurationError};
use vto_core::RawOutput;
use crate::config::AppConfig;
use crate::generator::backend::schemas::{
    decode_output, to_data_uri, GarmentInput, Prediction, PredictionInput, PredictionRequest,
};
use crate::generator::backend::{AiBackend, BackendRequest};

pub const MIN_IMAGE_SIDE: u32 = 256;
pub const MAX_IMAGE_SIDE: u32 = 4096;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Backend that runs predictions on a hosted model
pub struct RemoteBackend {
    client: Client,
    predictions_url: String,
    token: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl RemoteBackend {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigurationError> {
        let token = config.api_token.clone().ok_or(ConfigurationError::MissingCredential)?;

        let base = config.remote_endpoint.trim_end_matches('/');
        let predictions_url = format!("{}/models/{}/predictions", base, config.remote_model);
        reqwest::Url::parse(&predictions_url)
            .map_err(|e| ConfigurationError::Client(format!("invalid endpoint '{}': {}", predictions_url, e)))?;

        let client = Client::builder()
            .user_agent(concat!("vto/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigurationError::Client(e.to_string()))?;

        Ok(Self {
            client,
            predictions_url,
            token,
            timeout: config.remote_timeout,
            poll_interval: POLL_INTERVAL,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn request_body(request: &BackendRequest) -> PredictionRequest {
        PredictionRequest {
            input: PredictionInput {
                model_image: to_data_uri(&request.model_image),
                garments: request
                    .garments
                    .iter()
                    .map(|g| GarmentInput {
                        garment_type: g.garment_type.id().to_string(),
                        image: to_data_uri(&g.image),
                    })
                    .collect(),
                category: request.category.id().to_string(),
                num_outputs: request.options.output_count,
                seed: request.options.seed,
            },
        }
    }

    /// Poll a prediction that outlived the initial request until it reaches a terminal status.
    /// Bounded by the same timeout as the initial request.
    async fn await_prediction(&self, prediction: Prediction) -> Result<Prediction, BackendInvocationError> {
        let poll_url = prediction
            .poll_url()
            .ok_or_else(|| BackendInvocationError::service("Prediction still running but has no poll URL"))?
            .to_string();

        info!(
            "Prediction {} still {}, polling for up to {}s",
            prediction.id.as_deref().unwrap_or("?"),
            prediction.status,
            self.timeout.as_secs()
        );

        match tokio::time::timeout(self.timeout, self.poll(&poll_url)).await {
            Ok(result) => result,
            Err(_) => Err(BackendInvocationError::timeout(format!(
                "prediction did not finish within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn poll(&self, poll_url: &str) -> Result<Prediction, BackendInvocationError> {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(poll_url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(classify_transport)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, &body));
            }

            let prediction: Prediction = response
                .json()
                .await
                .map_err(|e| BackendInvocationError::service(format!("Malformed poll response: {}", e)))?;

            match prediction.status.as_str() {
                "starting" | "processing" => debug!("Prediction still {}", prediction.status),
                _ => return Ok(prediction),
            }
        }
    }
}

#[async_trait]
impl AiBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn invoke(&self, request: &BackendRequest) -> Result<RawOutput, BackendInvocationError> {
        check_dimensions(&request.model_image)?;

        let body = Self::request_body(request);
        debug!("Submitting prediction with {} garment(s)", body.input.garments.len());

        let response = self
            .client
            .post(&self.predictions_url)
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let mut prediction: Prediction = response
            .json()
            .await
            .map_err(|e| BackendInvocationError::service(format!("Malformed prediction response: {}", e)))?;

        if matches!(prediction.status.as_str(), "starting" | "processing") {
            prediction = self.await_prediction(prediction).await?;
        }

        match prediction.status.as_str() {
            "succeeded" => Ok(decode_output(prediction.output)),
            "failed" | "canceled" => Err(classify_message(&prediction.error_text())),
            other => Err(BackendInvocationError::service(format!("Unexpected prediction status '{}'", other))),
        }
    }
}

/// Reject images the hosted model can't take before spending a network round-trip
pub fn check_dimensions(bytes: &[u8]) -> Result<(u32, u32), BackendInvocationError> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| BackendInvocationError::invalid_input(format!("Unreadable model image: {}", e)))?
        .into_dimensions()
        .map_err(|e| BackendInvocationError::invalid_input(format!("Unreadable model image: {}", e)))?;

    let (short, long) = (width.min(height), width.max(height));
    if short < MIN_IMAGE_SIDE {
        return Err(BackendInvocationError::image_size(format!(
            "{}x{} is below the {}px minimum",
            width, height, MIN_IMAGE_SIDE
        )));
    }
    if long > MAX_IMAGE_SIDE {
        return Err(BackendInvocationError::image_size(format!(
            "{}x{} exceeds the {}px maximum",
            width, height, MAX_IMAGE_SIDE
        )));
    }

    Ok((width, height))
}

fn classify_transport(err: reqwest::Error) -> BackendInvocationError {
    if err.is_timeout() {
        BackendInvocationError::timeout(err.to_string())
    } else {
        BackendInvocationError::service(format!("Failed to reach AI service: {}", err))
    }
}

fn mentions_size(text: &str) -> bool {
    let text = text.to_lowercase();
    ["size", "dimension", "too large", "too small", "resolution"]
        .iter()
        .any(|needle| text.contains(needle))
}

pub fn classify_status(status: StatusCode, body: &str) -> BackendInvocationError {
    let detail = format!("HTTP {}: {}", status, body.trim());

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendErrorKind::Authentication,
        StatusCode::PAYLOAD_TOO_LARGE => BackendErrorKind::ImageSize,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY if mentions_size(body) => BackendErrorKind::ImageSize,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BackendErrorKind::InvalidInput,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BackendErrorKind::Timeout,
        _ => BackendErrorKind::Service,
    };

    BackendInvocationError::new(kind, detail)
}

/// Classify a failed prediction from its error text
pub fn classify_message(message: &str) -> BackendInvocationError {
    let lower = message.to_lowercase();

    let kind = if mentions_size(&lower) {
        BackendErrorKind::ImageSize
    } else if lower.contains("unauthorized") || lower.contains("authentication") || lower.contains("token") {
        BackendErrorKind::Authentication
    } else if lower.contains("timed out") || lower.contains("timeout") {
        BackendErrorKind::Timeout
    } else if lower.contains("invalid") || lower.contains("validation") || lower.contains("required") {
        BackendErrorKind::InvalidInput
    } else {
        BackendErrorKind::Service
    };

    BackendInvocationError::new(kind, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};
    use vto_core::{GarmentCategory, GarmentType, GenerationOptions, RawOutputItem};
    use crate::generator::backend::BackendGarment;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([9, 9, 9])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn request(model_image: Vec<u8>, output_count: u32) -> BackendRequest {
        BackendRequest {
            model_image,
            garments: vec![BackendGarment { garment_type: GarmentType::Top, image: png(8, 8) }],
            category: GarmentCategory::Top,
            options: GenerationOptions { output_count, seed: 1 },
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn backend(endpoint: &str) -> RemoteBackend {
        backend_with_timeout(endpoint, Duration::from_secs(5))
    }

    fn backend_with_timeout(endpoint: &str, remote_timeout: Duration) -> RemoteBackend {
        let config = AppConfig {
            api_token: Some("r8_test".into()),
            remote_endpoint: endpoint.to_string(),
            remote_model: "acme/tryon".into(),
            remote_timeout,
            ..AppConfig::default()
        };
        RemoteBackend::new(&config).unwrap().with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_dimension_checks() {
        assert!(check_dimensions(&png(300, 400)).is_ok());
        assert_eq!(check_dimensions(&png(100, 400)).unwrap_err().kind, BackendErrorKind::ImageSize);
        assert_eq!(check_dimensions(b"garbage").unwrap_err().kind, BackendErrorKind::InvalidInput);
    }

    #[test]
    fn test_status_classification() {
        let kind = |status, body| classify_status(status, body).kind;
        assert_eq!(kind(StatusCode::UNAUTHORIZED, ""), BackendErrorKind::Authentication);
        assert_eq!(kind(StatusCode::FORBIDDEN, ""), BackendErrorKind::Authentication);
        assert_eq!(kind(StatusCode::PAYLOAD_TOO_LARGE, ""), BackendErrorKind::ImageSize);
        assert_eq!(kind(StatusCode::UNPROCESSABLE_ENTITY, "image dimensions too large"), BackendErrorKind::ImageSize);
        assert_eq!(kind(StatusCode::UNPROCESSABLE_ENTITY, "seed must be an integer"), BackendErrorKind::InvalidInput);
        assert_eq!(kind(StatusCode::GATEWAY_TIMEOUT, ""), BackendErrorKind::Timeout);
        assert_eq!(kind(StatusCode::INTERNAL_SERVER_ERROR, ""), BackendErrorKind::Service);
    }

    #[test]
    fn test_message_classification() {
        assert_eq!(classify_message("Invalid token").kind, BackendErrorKind::Authentication);
        assert_eq!(classify_message("Prediction timed out").kind, BackendErrorKind::Timeout);
        assert_eq!(classify_message("input image size too small").kind, BackendErrorKind::ImageSize);
        assert_eq!(classify_message("garm_img is required").kind, BackendErrorKind::InvalidInput);
        assert_eq!(classify_message("CUDA out of memory").kind, BackendErrorKind::Service);
    }

    #[test]
    fn test_bad_endpoint_fails_construction() {
        let config = AppConfig {
            api_token: Some("r8_test".into()),
            remote_endpoint: "not a url".into(),
            ..AppConfig::default()
        };
        assert!(matches!(RemoteBackend::new(&config), Err(ConfigurationError::Client(_))));
    }

    #[tokio::test]
    async fn test_succeeded_prediction() {
        async fn predict(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
            assert_eq!(headers["authorization"], "Bearer r8_test");
            assert_eq!(body["input"]["category"], "top");
            assert_eq!(body["input"]["garments"][0]["type"], "top");
            assert!(body["input"]["model_image"].as_str().unwrap().starts_with("data:image/png;base64,"));
            Json(json!({"id": "p1", "status": "succeeded", "output": ["https://cdn/x.png", {"url": "https://cdn/y.png"}]}))
        }

        let base = serve(Router::new().route("/models/acme/tryon/predictions", post(predict))).await;
        let items = backend(&base).invoke(&request(png(300, 400), 2)).await.unwrap().into_items();

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], RawOutputItem::Url(u) if u == "https://cdn/x.png"));
        assert!(matches!(&items[1], RawOutputItem::StaticUrl { url } if url == "https://cdn/y.png"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_classified() {
        async fn predict() -> (StatusCode, &'static str) {
            (StatusCode::UNAUTHORIZED, "Invalid token")
        }

        let base = serve(Router::new().route("/models/acme/tryon/predictions", post(predict))).await;
        let err = backend(&base).invoke(&request(png(300, 400), 1)).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_failed_prediction_is_classified() {
        async fn predict() -> Json<Value> {
            Json(json!({"status": "failed", "error": "Image resolution too small"}))
        }

        let base = serve(Router::new().route("/models/acme/tryon/predictions", post(predict))).await;
        let err = backend(&base).invoke(&request(png(300, 400), 1)).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::ImageSize);
    }

    /// Initial response of a prediction that is still running, pointing at `/predictions/p1`
    async fn still_processing(headers: HeaderMap) -> Json<Value> {
        let poll_url = format!("http://{}/predictions/p1", headers["host"].to_str().unwrap());
        Json(json!({"id": "p1", "status": "processing", "urls": {"get": poll_url}}))
    }

    async fn pending_api(poll: axum::routing::MethodRouter) -> String {
        serve(
            Router::new()
                .route("/models/acme/tryon/predictions", post(still_processing))
                .route("/predictions/p1", poll),
        )
        .await
    }

    #[tokio::test]
    async fn test_pending_prediction_is_polled_to_completion() {
        let polls = Arc::new(AtomicUsize::new(0));

        async fn poll(State(polls): State<Arc<AtomicUsize>>, headers: HeaderMap) -> Json<Value> {
            assert_eq!(headers["authorization"], "Bearer r8_test");
            if polls.fetch_add(1, Ordering::SeqCst) < 2 {
                Json(json!({"status": "processing"}))
            } else {
                Json(json!({"status": "succeeded", "output": ["https://cdn/0.png", "https://cdn/1.png"]}))
            }
        }

        let router = Router::new()
            .route("/models/acme/tryon/predictions", post(still_processing))
            .route("/predictions/p1", get(poll))
            .with_state(polls.clone());
        let base = serve(router).await;

        let items = backend(&base).invoke(&request(png(300, 400), 2)).await.unwrap().into_items();

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], RawOutputItem::Url(u) if u == "https://cdn/0.png"));
        assert!(matches!(&items[1], RawOutputItem::Url(u) if u == "https://cdn/1.png"));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pending_prediction_failure_is_classified() {
        let base = pending_api(get(|| async {
            Json(json!({"status": "failed", "error": "Prediction timed out"}))
        }))
        .await;

        let err = backend(&base).invoke(&request(png(300, 400), 1)).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Timeout);
        assert_eq!(err.to_string(), "The AI service did not respond in time: Prediction timed out");
    }

    #[tokio::test]
    async fn test_canceled_prediction_fails() {
        let base = pending_api(get(|| async { Json(json!({"status": "canceled"})) })).await;

        let err = backend(&base).invoke(&request(png(300, 400), 1)).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Service);
        assert_eq!(err.detail, "prediction canceled");
    }

    #[tokio::test]
    async fn test_poll_error_status_is_classified() {
        let cases = [
            (StatusCode::UNAUTHORIZED, BackendErrorKind::Authentication),
            (StatusCode::INTERNAL_SERVER_ERROR, BackendErrorKind::Service),
        ];

        for (status, kind) in cases {
            let base = pending_api(get(move || async move { (status, "nope") })).await;
            let err = backend(&base).invoke(&request(png(300, 400), 1)).await.unwrap_err();
            assert_eq!(err.kind, kind, "poll answering {}", status);
        }
    }

    #[tokio::test]
    async fn test_poll_deadline_is_a_timeout() {
        let base = pending_api(get(|| async { Json(json!({"status": "processing"})) })).await;

        let started = std::time::Instant::now();
        let err = backend_with_timeout(&base, Duration::from_millis(200))
            .invoke(&request(png(300, 400), 1))
            .await
            .unwrap_err();

        assert_eq!(err.kind, BackendErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pending_prediction_without_poll_url() {
        let base = serve(Router::new().route(
            "/models/acme/tryon/predictions",
            post(|| async { Json(json!({"id": "p1", "status": "starting"})) }),
        ))
        .await;

        let err = backend(&base).invoke(&request(png(300, 400), 1)).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Service);
    }
}
