use std::{ops::Deref, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;
use tristat::{
    party::PartyError,
    peer::{
        ComputeRequest, ComputeResponse, MaskRequest, MaskResponse, SumRequest, SumResponse,
    },
    protocol::{self, ErrorClass, Orchestrator, StatisticRequest, StatisticResult},
    store::MemoryStore,
    triples::TripleDealer,
};

use crate::peer_client::HttpPeerClient;

pub(crate) type HttpOrchestrator = Orchestrator<MemoryStore, HttpPeerClient, TripleDealer>;

#[derive(Clone)]
pub(crate) struct TristatState(Arc<HttpOrchestrator>);

impl TristatState {
    pub(crate) fn new(orchestrator: HttpOrchestrator) -> Self {
        Self(Arc::new(orchestrator))
    }
}

impl Deref for TristatState {
    type Target = HttpOrchestrator;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub(crate) async fn health() -> StatusCode {
    StatusCode::OK
}

pub(crate) async fn sum(
    State(state): State<TristatState>,
    Json(req): Json<SumRequest>,
) -> Result<Json<SumResponse>, ApiError> {
    Ok(Json(state.party().handle_sum(req)?))
}

pub(crate) async fn beaver_mask(
    State(state): State<TristatState>,
    Json(req): Json<MaskRequest>,
) -> Result<Json<MaskResponse>, ApiError> {
    Ok(Json(state.party().handle_beaver_mask(req)?))
}

pub(crate) async fn beaver_compute(
    State(state): State<TristatState>,
    Json(req): Json<ComputeRequest>,
) -> Result<Json<ComputeResponse>, ApiError> {
    Ok(Json(state.party().handle_beaver_compute(req)?))
}

/// Computes a statistic with this party as the orchestrator.
///
/// The kind of statistic is taken from the path, the attribute names from the body, e.g.
/// `POST /compute/correlation` with `{"statistic1": "gpa", "statistic2": "age"}`.
pub(crate) async fn compute(
    State(state): State<TristatState>,
    Path(kind): Path<String>,
    Json(mut body): Json<Map<String, Value>>,
) -> Result<Json<StatisticResult>, ApiError> {
    body.insert("kind".to_string(), Value::String(kind));
    let req: StatisticRequest =
        serde_json::from_value(Value::Object(body)).map_err(ApiError::InvalidRequest)?;
    Ok(Json(state.compute(req).await?))
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "details")]
pub(crate) enum ApiError {
    #[serde(serialize_with = "crate::serialize_error_chain")]
    InvalidRequest(serde_json::Error),
    #[serde(serialize_with = "crate::serialize_error_chain")]
    Statistic(protocol::Error),
    #[serde(serialize_with = "crate::serialize_error_chain")]
    Party(PartyError),
}

impl From<protocol::Error> for ApiError {
    fn from(err: protocol::Error) -> Self {
        Self::Statistic(err)
    }
}

impl From<PartyError> for ApiError {
    fn from(err: PartyError) -> Self {
        Self::Party(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Statistic(err) => match (err.class(), err) {
                (ErrorClass::Configuration, _) => StatusCode::BAD_REQUEST,
                (ErrorClass::UndefinedMath, _) => StatusCode::UNPROCESSABLE_ENTITY,
                (ErrorClass::Coordination, protocol::Error::PeerUnavailable { .. }) => {
                    StatusCode::BAD_GATEWAY
                }
                (ErrorClass::Coordination, _) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Party(
                PartyError::UnknownParty(_) | PartyError::Seal(_) | PartyError::Alignment(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Party(PartyError::Domain(_) | PartyError::Store(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = match serde_json::to_string_pretty(&self) {
            Ok(body) => body,
            Err(err) => {
                error!(%err, "unable to serialize error. Returning status code 500.");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "error serialization failed",
                )
                    .into_response();
            }
        };
        let status_code = self.status_code();
        error!(err = body, %status_code);
        (status_code, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use tristat::{attribute::Attribute, beaver::AlignmentError};

    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        let undefined = ApiError::from(protocol::Error::DivisionByZero(Attribute::Age));
        assert_eq!(undefined.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let invalid = ApiError::from(protocol::Error::InvalidAttribute(
            "height".parse::<Attribute>().unwrap_err(),
        ));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let misaligned = ApiError::from(protocol::Error::Alignment(AlignmentError::Length {
            what: "d shares",
            expected: 2,
            actual: 1,
        }));
        assert_eq!(misaligned.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let peer = ApiError::from(PartyError::UnknownParty(4));
        assert_eq!(peer.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn error_body_contains_chain() {
        let err = ApiError::from(protocol::Error::Alignment(AlignmentError::Length {
            what: "d shares",
            expected: 2,
            actual: 1,
        }));
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["type"], "Statistic");
        let details = body["details"].as_str().unwrap();
        assert!(details.starts_with("Error: record batches are misaligned"));
        assert!(details.contains("d shares has 1 entries, expected 2"));
    }
}
