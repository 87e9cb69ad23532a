use reqwest_middleware::ClientWithMiddleware;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{Level, error};
use tristat::{
    PartyId,
    peer::{
        ComputeRequest, ComputeResponse, MaskRequest, MaskResponse, PeerClient, SumRequest,
        SumResponse,
    },
};
use url::Url;

use crate::format_error_chain;

/// A [`PeerClient`] that calls the other parties' HTTP endpoints.
#[derive(Clone)]
pub(crate) struct HttpPeerClient {
    client: ClientWithMiddleware,
    participants: Vec<Url>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpClientError {
    #[error("party {0} has no configured URL")]
    UnknownParty(PartyId),
    #[error("unable to build URL for route {route}")]
    Url {
        route: &'static str,
        source: url::ParseError,
    },
    #[error("failed request to {url}")]
    Request {
        url: Url,
        source: reqwest_middleware::Error,
    },
    #[error("invalid response from {url}")]
    Response { url: Url, source: reqwest::Error },
    #[error("{route} request failed with status {status}: {body}")]
    Status {
        route: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl HttpPeerClient {
    pub(crate) fn new(client: ClientWithMiddleware, participants: Vec<Url>) -> Self {
        Self {
            client,
            participants,
        }
    }

    async fn make_request<Req, Resp>(
        &self,
        route: &'static str,
        to: PartyId,
        req: Req,
    ) -> Result<Resp, HttpClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self
            .participants
            .get(to)
            .ok_or(HttpClientError::UnknownParty(to))?
            .join(route)
            .map_err(|source| HttpClientError::Url { route, source })?;
        let resp = self
            .client
            .post(url.clone())
            .json(&req)
            .send()
            .await
            .map_err(|source| HttpClientError::Request {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if status.is_success() {
            resp.json()
                .await
                .map_err(|source| HttpClientError::Response { url, source })
        } else {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|err| format_error_chain(&err));
            let err = HttpClientError::Status {
                route,
                status,
                body,
            };
            error!(%err, to);
            Err(err)
        }
    }
}

impl PeerClient for HttpPeerClient {
    type Error = HttpClientError;

    #[tracing::instrument(
        level = Level::DEBUG,
        skip(self, req),
        fields(request_id = %req.request_id),
        err
    )]
    async fn sum(&self, to: PartyId, req: SumRequest) -> Result<SumResponse, Self::Error> {
        self.make_request("sum", to, req).await
    }

    #[tracing::instrument(
        level = Level::DEBUG,
        skip(self, req),
        fields(request_id = %req.request_id),
        err
    )]
    async fn beaver_mask(
        &self,
        to: PartyId,
        req: MaskRequest,
    ) -> Result<MaskResponse, Self::Error> {
        self.make_request("beaver_mask", to, req).await
    }

    #[tracing::instrument(
        level = Level::DEBUG,
        skip(self, req),
        fields(request_id = %req.request_id),
        err
    )]
    async fn beaver_compute(
        &self,
        to: PartyId,
        req: ComputeRequest,
    ) -> Result<ComputeResponse, Self::Error> {
        self.make_request("beaver_compute", to, req).await
    }
}
