// Copyright 2023-, GraphOps and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! A thin GraphQL client for querying the network/escrow subgraphs behind
//! graph-node, optionally authenticated with a bearer token.

use graphql_client::GraphQLQuery;
use reqwest::Url;

/// Where to find a subgraph deployment: either a graph-node query URL
/// directly, or (not modeled here) resolution via an indexer's own
/// allocation query interface.
#[derive(Clone, Debug)]
pub struct DeploymentDetails {
    query_url: Url,
}

impl DeploymentDetails {
    pub fn for_query_url(query_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            query_url: Url::parse(query_url)?,
        })
    }
}

/// Queries a single subgraph deployment, optionally bearer-authenticated.
pub struct SubgraphClient {
    client: reqwest::Client,
    bearer_token: Option<String>,
    deployment: DeploymentDetails,
}

impl SubgraphClient {
    pub fn new(
        client: reqwest::Client,
        bearer_token: Option<&str>,
        deployment: DeploymentDetails,
    ) -> Self {
        Self {
            client,
            bearer_token: bearer_token.map(str::to_owned),
            deployment,
        }
    }

    /// Executes `Q` against the configured deployment, returning the
    /// transport result on the outside and the GraphQL-level result
    /// (data vs. errors) on the inside.
    pub async fn query<Q>(
        &self,
        variables: Q::Variables,
    ) -> anyhow::Result<Result<Q::ResponseData, String>>
    where
        Q: GraphQLQuery,
    {
        let body = Q::build_query(variables);
        let mut request = self.client.post(self.deployment.query_url.clone());
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response: graphql_client::Response<Q::ResponseData> =
            request.json(&body).send().await?.error_for_status()?.json().await?;

        match (response.data, response.errors) {
            (Some(data), None) => Ok(Ok(data)),
            (_, Some(errors)) => Ok(Err(errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; "))),
            (None, None) => Ok(Err("empty GraphQL response".to_string())),
        }
    }
}
