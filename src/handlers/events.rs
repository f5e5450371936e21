use crate::{error::AppError, state::AppState};
use actix_web::{http::StatusCode, web, HttpResponse};
use serde_json::Value;
use tracing::debug;

/// Run one raw event through the orchestrator.
///
/// The response body is the envelope itself and the HTTP status mirrors its
/// `statusCode`, so a failed ingestion is a 500 with the structured error.
pub async fn ingest_event(
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    let event = body.into_inner();
    debug!(top_level_keys = ?event.as_object().map(|o| o.len()), "Received event");

    let orchestrator = state.orchestrator.clone();
    let envelope = web::block(move || orchestrator.handle(event))
        .await
        .map_err(|e| AppError::Internal(format!("Ingestion worker unavailable: {}", e)))?;

    state.record_ingest_outcome(envelope.channel, envelope.error_code);

    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(HttpResponse::build(status).json(&envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;
    use actix_web::{test, App};
    use serde_json::json;

    #[actix_web::test]
    async fn test_upload_event_round_trip() {
        let (objects, state) = test_state();
        let mut audio = b"ID3".to_vec();
        audio.resize(48_000, 0);
        objects.insert("vaani-user-inputs", "audio/+919876543210/1.mp3", audio);
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/events", web::post().to(ingest_event)),
        )
        .await;

        let event = json!({"Records": [{
            "eventSource": "aws:s3",
            "s3": {
                "bucket": {"name": "vaani-user-inputs"},
                "object": {"key": "audio/+919876543210/1.mp3"}
            }
        }]});
        let req = test::TestRequest::post().uri("/events").set_json(&event).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["statusCode"], 200);
        assert_eq!(body["body"]["result"]["phone_number"], "+919876543210");
        assert_eq!(body["body"]["result"]["duration_seconds"], 3.0);
        assert_eq!(data.get_metrics_snapshot().events_by_channel["upload"], 1);
    }

    #[actix_web::test]
    async fn test_unknown_event_is_500_envelope() {
        let (_, state) = test_state();
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/events", web::post().to(ingest_event)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events")
            .set_json(json!({"hello": "world"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["body"]["success"], false);
        assert_eq!(body["body"]["error"]["error_code"], "AUDIO_001");
        assert_eq!(data.get_metrics_snapshot().failures_by_code["AUDIO_001"], 1);
    }
}
