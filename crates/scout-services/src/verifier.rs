//! Coordinator verification over HTTP.
//!
//! A candidate is only as good as the endpoint it advertises, so before it
//! can be used the endpoint's status is fetched and the live round located:
//!
//!   endpoint tag → POST {endpoint}/wabisabi/status → latest round by
//!   inputRegistrationEnd → its RoundCreated event → roundParameters
//!
//! Every failure is returned as a `VerificationError`; nothing here panics
//! or outlives its own request timeout.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Url;

use scout_core::round::{RoundState, STATUS_PATH};
use scout_core::{DiscoveryEvent, RoundParameters, StatusRequest, StatusResponse};

/// A verified candidate and the parameters of its current round.
#[derive(Debug, Clone)]
pub struct ResolvedCoordinator {
    pub event: DiscoveryEvent,
    /// Endpoint as advertised, written to the wallet config on selection.
    pub endpoint: String,
    pub parameters: RoundParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Candidate has no endpoint")]
    MissingEndpoint,

    #[error("Could not connect")]
    EndpointUnreachable,

    #[error("No active rounds")]
    NoActiveRounds,

    #[error("No round created event")]
    NoRoundCreatedEvent,

    #[error("Error fetching round: {0}")]
    VerificationFailed(String),
}

fn failed(e: impl std::fmt::Display) -> VerificationError {
    VerificationError::VerificationFailed(e.to_string())
}

#[derive(Clone)]
pub struct CoordinatorVerifier {
    client: reqwest::Client,
}

impl CoordinatorVerifier {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn verify(
        &self,
        candidate: &DiscoveryEvent,
    ) -> Result<ResolvedCoordinator, VerificationError> {
        let endpoint = candidate
            .endpoint()
            .ok_or(VerificationError::MissingEndpoint)?;
        let url = status_url(endpoint)?;

        tracing::debug!(pubkey = candidate.short_pubkey(), url = %url, "verifying coordinator");

        let response = self
            .client
            .post(url)
            .json(&StatusRequest::default())
            .send()
            .await
            .map_err(failed)?;

        if !response.status().is_success() {
            tracing::warn!(
                pubkey = candidate.short_pubkey(),
                status = %response.status(),
                "coordinator status request rejected"
            );
            return Err(VerificationError::EndpointUnreachable);
        }

        let status: StatusResponse = response.json().await.map_err(failed)?;
        let parameters = latest_round_parameters(status)?;

        tracing::info!(
            pubkey = candidate.short_pubkey(),
            endpoint,
            network = %parameters.network,
            "coordinator verified"
        );

        Ok(ResolvedCoordinator {
            event: candidate.clone(),
            endpoint: endpoint.to_string(),
            parameters,
        })
    }
}

/// `{endpoint}/wabisabi/status`, treating the endpoint as a directory.
pub fn status_url(endpoint: &str) -> Result<Url, VerificationError> {
    let mut base = endpoint.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).and_then(|u| u.join(STATUS_PATH)).map_err(failed)
}

/// Parameters of the round whose input registration ends last.
pub fn latest_round_parameters(status: StatusResponse) -> Result<RoundParameters, VerificationError> {
    let states = status.round_states.unwrap_or_default();

    let mut latest: Option<(DateTime<Utc>, RoundState)> = None;
    for state in states {
        let ends = parse_timestamp(&state.input_registration_end).map_err(|e| {
            failed(format!(
                "bad inputRegistrationEnd {:?}: {e}",
                state.input_registration_end
            ))
        })?;
        // first of equal timestamps wins
        if latest.as_ref().map_or(true, |(best, _)| ends > *best) {
            latest = Some((ends, state));
        }
    }
    let (_, round) = latest.ok_or(VerificationError::NoActiveRounds)?;

    let created = round
        .round_created()
        .ok_or(VerificationError::NoRoundCreatedEvent)?;

    created
        .round_parameters
        .clone()
        .ok_or_else(|| failed("RoundCreated event carries no roundParameters"))
}

/// ISO-8601 date-time. A value without an offset is taken as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(e) => ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|t| t.and_utc())
            .ok_or(e),
    }
}
