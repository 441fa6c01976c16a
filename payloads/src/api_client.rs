use crate::{AuctionId, BidId, requests, responses};
use reqwest::StatusCode;
use serde::Serialize;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for interfacing with the engine.
pub struct APIClient {
    pub address: String,
    pub inner_client: reqwest::Client,
}

/// Helper methods for http actions.
impl APIClient {
    fn format_url(&self, path: &str) -> String {
        format!("{}/api/{path}", &self.address)
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        let request = self.inner_client.post(self.format_url(path)).json(body);

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }

    async fn put(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        let request = self.inner_client.put(self.format_url(path)).json(body);

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }

    async fn delete(&self, path: &str) -> ReqwestResult {
        let request = self.inner_client.delete(self.format_url(path));

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }

    async fn empty_get(&self, path: &str) -> ReqwestResult {
        let request = self.inner_client.get(self.format_url(path));

        #[cfg(target_arch = "wasm32")]
        let request = request.fetch_credentials_include();

        request.send().await
    }
}

/// Methods on the engine's HTTP API.
impl APIClient {
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let response = self.empty_get("health_check").await?;
        ok_empty(response).await
    }

    pub async fn register(
        &self,
        details: &requests::Register,
    ) -> Result<responses::AuthResponse, ClientError> {
        let response = self.post("auth/register", details).await?;
        ok_body(response).await
    }

    pub async fn login(
        &self,
        details: &requests::Login,
    ) -> Result<responses::AuthResponse, ClientError> {
        let response = self.post("auth/login", details).await?;
        ok_body(response).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self.post("auth/logout", &()).await?;
        ok_empty(response).await
    }

    pub async fn me(&self) -> Result<responses::UserProfile, ClientError> {
        let response = self.empty_get("auth/me").await?;
        ok_body(response).await
    }

    pub async fn create_auction(
        &self,
        details: &requests::CreateAuction,
    ) -> Result<responses::AuctionWithRounds, ClientError> {
        let response = self.post("auctions", details).await?;
        ok_body(response).await
    }

    pub async fn list_auctions(
        &self,
        query: &requests::ListAuctions,
    ) -> Result<responses::AuctionList, ClientError> {
        let mut params = Vec::new();
        if let Some(status) = &query.status {
            params.push(format!("status={status}"));
        }
        if let Some(page) = query.page {
            params.push(format!("page={page}"));
        }
        if let Some(limit) = query.limit {
            params.push(format!("limit={limit}"));
        }
        let path = if params.is_empty() {
            "auctions".to_string()
        } else {
            format!("auctions?{}", params.join("&"))
        };
        let response = self.empty_get(&path).await?;
        ok_body(response).await
    }

    pub async fn get_auction(
        &self,
        auction_id: AuctionId,
    ) -> Result<responses::Auction, ClientError> {
        let response = self
            .empty_get(&format!("auctions/{auction_id}"))
            .await?;
        ok_body(response).await
    }

    pub async fn start_auction(
        &self,
        auction_id: AuctionId,
    ) -> Result<responses::Auction, ClientError> {
        let response = self
            .post(&format!("auctions/{auction_id}/start"), &())
            .await?;
        ok_body(response).await
    }

    pub async fn cancel_auction(&self, auction_id: AuctionId) -> Result<(), ClientError> {
        let response = self.delete(&format!("auctions/{auction_id}")).await?;
        ok_empty(response).await
    }

    pub async fn current_round(
        &self,
        auction_id: AuctionId,
    ) -> Result<responses::Round, ClientError> {
        let response = self
            .empty_get(&format!("auctions/{auction_id}/current-round"))
            .await?;
        ok_body(response).await
    }

    pub async fn leaderboard(
        &self,
        auction_id: AuctionId,
        round_number: i32,
    ) -> Result<responses::Leaderboard, ClientError> {
        let response = self
            .empty_get(&format!(
                "auctions/{auction_id}/rounds/{round_number}/leaderboard"
            ))
            .await?;
        ok_body(response).await
    }

    pub async fn my_position(
        &self,
        auction_id: AuctionId,
    ) -> Result<responses::MyPosition, ClientError> {
        let response = self
            .empty_get(&format!("auctions/{auction_id}/my-position"))
            .await?;
        ok_body(response).await
    }

    pub async fn place_bid(
        &self,
        details: &requests::PlaceBid,
    ) -> Result<responses::Bid, ClientError> {
        let response = self.post("bids", details).await?;
        ok_body(response).await
    }

    pub async fn increase_bid(
        &self,
        bid_id: BidId,
        details: &requests::IncreaseBid,
    ) -> Result<responses::Bid, ClientError> {
        let response = self.put(&format!("bids/{bid_id}"), details).await?;
        ok_body(response).await
    }

    pub async fn cancel_bid(&self, bid_id: BidId) -> Result<(), ClientError> {
        let response = self.delete(&format!("bids/{bid_id}")).await?;
        ok_empty(response).await
    }

    pub async fn get_bid(
        &self,
        bid_id: BidId,
    ) -> Result<responses::BidWithHistory, ClientError> {
        let response = self.empty_get(&format!("bids/{bid_id}")).await?;
        ok_body(response).await
    }

    pub async fn my_balance(&self) -> Result<responses::Balance, ClientError> {
        let response = self.empty_get("users/me/balance").await?;
        ok_body(response).await
    }

    pub async fn my_transactions(
        &self,
        query: &requests::ListTransactions,
    ) -> Result<responses::TransactionList, ClientError> {
        let mut params = Vec::new();
        if let Some(page) = query.page {
            params.push(format!("page={page}"));
        }
        if let Some(limit) = query.limit {
            params.push(format!("limit={limit}"));
        }
        let path = if params.is_empty() {
            "users/me/transactions".to_string()
        } else {
            format!("users/me/transactions?{}", params.join("&"))
        };
        let response = self.empty_get(&path).await?;
        ok_body(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An unhandled API error to display, containing response text.
    #[error("{1}")]
    APIError(StatusCode, String),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
}

/// Deserialize a successful request into the desired type, or return an
/// appropriate error.
pub async fn ok_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(response.json::<T>().await?)
}

/// Check that an empty response is OK, returning a ClientError if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(())
}
