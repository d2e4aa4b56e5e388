// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Generic HTTP transport for the receipt-gated query ingress. This
//! module is intentionally thin: it owns routing, header extraction, and
//! status-code translation; everything about *what a receipt means* is
//! delegated to the [`IndexerServiceImpl`] the binary wires in (in this
//! workspace, the `indexer-tap` receipt store).

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use axum_extra::TypedHeader;
use serde::Serialize;
use thegraph::types::DeploymentId;
use tower_http::trace::TraceLayer;

use super::{config::ServerConfig, scalar_receipt_header::ScalarReceipt};

/// A release identifier surfaced on the `/` status route, analogous to
/// `build-info` in the teacher's `Cargo.toml` dependency set but kept
/// plain here since ambient build metadata isn't part of the core.
#[derive(Clone, Debug, Serialize)]
pub struct IndexerServiceRelease {
    pub version: String,
    pub dependencies: Vec<(String, String)>,
}

/// Whether a deployment's responses are attestable (signed). Out of
/// scope for the core pipeline, but part of the ingress contract the
/// teacher's `IsAttestable` marker exposes.
pub trait IsAttestable {
    fn is_attestable(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct IndexerServiceOptions {
    pub release: IndexerServiceRelease,
    pub url_prefix: String,
    pub free_query_auth_token: Option<String>,
}

/// The error an [`IndexerServiceImpl`] produces for a given request,
/// translated into the status codes described in the external-interfaces
/// contract: `402` missing/invalid receipt, `400` schema error, `5xx`
/// backend failure.
pub enum IndexerServiceError {
    MissingReceipt,
    InvalidReceipt(String),
    Schema(String),
    Backend(anyhow::Error),
}

impl IntoResponse for IndexerServiceError {
    fn into_response(self) -> Response {
        match self {
            IndexerServiceError::MissingReceipt => {
                (StatusCode::PAYMENT_REQUIRED, "payment required").into_response()
            }
            IndexerServiceError::InvalidReceipt(reason) => {
                (StatusCode::PAYMENT_REQUIRED, reason).into_response()
            }
            IndexerServiceError::Schema(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
            IndexerServiceError::Backend(err) => {
                tracing::error!("backend error while proxying query: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

/// The contract the receipt-gated query ingress consumes. A concrete
/// implementation validates and stores the receipt (component A), then
/// proxies the query body to graph-node.
#[async_trait]
pub trait IndexerServiceImpl: Send + Sync + 'static {
    async fn process_request(
        &self,
        deployment: DeploymentId,
        receipt: Option<String>,
        query_body: String,
    ) -> Result<String, IndexerServiceError>;
}

pub struct IndexerService<I> {
    options: IndexerServiceOptions,
    imp: Arc<I>,
}

impl<I: IndexerServiceImpl> IndexerService<I> {
    pub fn new(options: IndexerServiceOptions, imp: I) -> Self {
        Self {
            options,
            imp: Arc::new(imp),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(
                &format!("{}/subgraphs/id/:deployment", self.options.url_prefix),
                post(handle_query::<I>),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.imp.clone())
    }

    pub async fn run(&self, server: &ServerConfig) -> anyhow::Result<()> {
        let addr: SocketAddr = server.host_and_port;
        tracing::info!("listening on {addr} with prefix {}", self.options.url_prefix);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn handle_query<I: IndexerServiceImpl>(
    State(imp): State<Arc<I>>,
    Path(deployment): Path<String>,
    receipt: Option<TypedHeader<ScalarReceipt>>,
    query_body: String,
) -> Response {
    let deployment = match DeploymentId::from_str_or_bail(&deployment) {
        Ok(d) => d,
        Err(reason) => return IndexerServiceError::Schema(reason).into_response(),
    };
    let receipt = receipt.and_then(|TypedHeader(ScalarReceipt(r))| r);

    match imp.process_request(deployment, receipt, query_body).await {
        Ok(response) => response.into_response(),
        Err(err) => err.into_response(),
    }
}

/// Small helper trait so the handler doesn't need to depend on a specific
/// `DeploymentId::from_str` error type.
trait FromStrOrBail: Sized {
    fn from_str_or_bail(s: &str) -> Result<Self, String>;
}

impl FromStrOrBail for DeploymentId {
    fn from_str_or_bail(s: &str) -> Result<Self, String> {
        use std::str::FromStr;
        DeploymentId::from_str(s).map_err(|e| format!("invalid deployment id `{s}`: {e}"))
    }
}
