//! JSON contract for an HTTP routing layer. Transport-agnostic: each handler
//! takes a decoded body and returns either a response body or an [`ApiError`]
//! carrying the status code to send.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::DEFAULT_SIMILAR_LIMIT;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub campground_id: Ulid,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationCreated {
    pub reservation_id: Ulid,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRef {
    pub reservation_id: Ulid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResponse {
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarRequest {
    pub campground_id: Ulid,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarResponse {
    pub data: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub body: ErrorBody,
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self {
            status: e.http_status(),
            body: ErrorBody {
                error: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

impl ApiError {
    fn validation(message: String) -> Self {
        Self {
            status: 400,
            body: ErrorBody {
                error: "ValidationError",
                message,
            },
        }
    }
}

/// Decode a request body, reporting malformed JSON as a validation error.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("bad request body: {e}")))
}

fn parse_date(field: &str, value: &str) -> Result<Ms, ApiError> {
    parse_instant(value).ok_or_else(|| ApiError::validation(format!("{field}: bad date {value:?}")))
}

/// `user_id` comes from the authenticated session, never from the body.
pub async fn create_reservation(
    engine: &Engine,
    user_id: &str,
    req: CreateReservationRequest,
) -> Result<ReservationCreated, ApiError> {
    let start = parse_date("startDate", &req.start_date)?;
    let end = parse_date("endDate", &req.end_date)?;
    let reservation = engine
        .request_reservation(
            Ulid::new(),
            req.campground_id,
            user_id.to_string(),
            Span::unchecked(start, end),
            req.count.unwrap_or(1),
        )
        .await?;
    Ok(ReservationCreated {
        reservation_id: reservation.id,
        status: reservation.status,
    })
}

pub async fn confirm_reservation(
    engine: &Engine,
    req: ReservationRef,
) -> Result<StatusResponse, ApiError> {
    let r = engine.confirm_reservation(req.reservation_id).await?;
    Ok(StatusResponse { status: r.status })
}

pub async fn cancel_reservation(
    engine: &Engine,
    req: ReservationRef,
) -> Result<StatusResponse, ApiError> {
    let r = engine.cancel_reservation(req.reservation_id).await?;
    Ok(StatusResponse { status: r.status })
}

pub async fn similar_campgrounds(
    engine: &Engine,
    req: SimilarRequest,
) -> Result<SimilarResponse, ApiError> {
    let ranked = engine
        .similar_to(req.campground_id, req.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT))
        .await?;
    Ok(SimilarResponse {
        data: ranked.into_iter().map(|s| s.id).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use serde_json::json;

    async fn engine_with_campground(capacity: u32) -> (Engine, Ulid) {
        let engine = Engine::in_memory(EngineConfig::default());
        let cid = Ulid::new();
        engine
            .create_campground(cid, Some("Pine Flat".into()), capacity)
            .await
            .unwrap();
        (engine, cid)
    }

    fn create_body(cid: Ulid, start: &str, end: &str) -> CreateReservationRequest {
        decode(
            json!({ "campgroundId": cid, "startDate": start, "endDate": end })
                .to_string()
                .as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_returns_pending_in_camel_case() {
        let (engine, cid) = engine_with_campground(1).await;
        let created = create_reservation(&engine, "user-1", create_body(cid, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        let body = serde_json::to_value(&created).unwrap();
        assert_eq!(body["status"], "Pending");
        assert_eq!(body["reservationId"], json!(created.reservation_id));
    }

    #[tokio::test]
    async fn capacity_rejection_is_400() {
        let (engine, cid) = engine_with_campground(1).await;
        create_reservation(&engine, "a", create_body(cid, "2024-06-01", "2024-06-05"))
            .await
            .unwrap();
        let err = create_reservation(&engine, "b", create_body(cid, "2024-06-03", "2024-06-04"))
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.body.error, "CapacityExceeded");
        let rendered = serde_json::to_value(&err.body).unwrap();
        assert_eq!(rendered["error"], "CapacityExceeded");
        assert!(rendered["message"].as_str().unwrap().contains("capacity"));
    }

    #[tokio::test]
    async fn unknown_campground_is_404() {
        let engine = Engine::in_memory(EngineConfig::default());
        let err = create_reservation(
            &engine,
            "a",
            create_body(Ulid::new(), "2024-06-01", "2024-06-02"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(err.body.error, "NotFound");
    }

    #[tokio::test]
    async fn bad_dates_are_validation_errors() {
        let (engine, cid) = engine_with_campground(1).await;
        let err = create_reservation(&engine, "a", create_body(cid, "soon", "2024-06-02"))
            .await
            .unwrap_err();
        assert_eq!((err.status, err.body.error), (400, "ValidationError"));

        let err = create_reservation(&engine, "a", create_body(cid, "2024-06-05", "2024-06-01"))
            .await
            .unwrap_err();
        assert_eq!((err.status, err.body.error), (400, "ValidationError"));
    }

    #[tokio::test]
    async fn confirm_then_cancel_then_confirm_is_409() {
        let (engine, cid) = engine_with_campground(2).await;
        let created = create_reservation(&engine, "a", create_body(cid, "2024-06-01", "2024-06-03"))
            .await
            .unwrap();
        let r = ReservationRef {
            reservation_id: created.reservation_id,
        };

        let confirmed = confirm_reservation(&engine, r.clone()).await.unwrap();
        assert_eq!(serde_json::to_value(&confirmed).unwrap(), json!({ "status": "Confirmed" }));
        let cancelled = cancel_reservation(&engine, r.clone()).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);

        let err = confirm_reservation(&engine, r).await.unwrap_err();
        assert_eq!((err.status, err.body.error), (409, "InvalidTransition"));
    }

    #[tokio::test]
    async fn similar_returns_ids_under_data() {
        let (engine, x) = engine_with_campground(1).await;
        let y = Ulid::new();
        engine.create_campground(y, None, 1).await.unwrap();
        let tag = Ulid::new();
        engine.create_tag(tag, "creek").await.unwrap();
        engine.attach_tag(x, tag).await.unwrap();
        engine.attach_tag(y, tag).await.unwrap();

        let req: SimilarRequest = decode(json!({ "campgroundId": x }).to_string().as_bytes()).unwrap();
        let resp = similar_campgrounds(&engine, req).await.unwrap();
        assert_eq!(serde_json::to_value(&resp).unwrap(), json!({ "data": [y] }));
    }

    #[test]
    fn malformed_body_is_400() {
        let err = decode::<ReservationRef>(b"{\"reservationId\": 7}").unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.body.error, "ValidationError");
    }
}
