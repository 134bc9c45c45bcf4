use core_types::{AccountId, Direction, OrderRequest, Symbol};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub mod error;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use types::*;

impl TerminalBridge {
    /// Constructs a new bridge client.
    pub fn new(base_url: String, auth_token: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            auth_token,
            base_url,
        }
    }

    /// Parses a bridge response body, surfacing the bridge's error object
    /// if one is present instead of the expected payload.
    fn parse_response<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        let value: Value = serde_json::from_str(body)?;

        // The bridge returns { "code": ..., "msg": ... } on failure.
        if let Some(code) = value.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let msg = value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string();
                return Err(Error::BridgeError { code, msg });
            }
        }

        Ok(serde_json::from_value(value)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let body = self
            .http_client
            .get(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(Error::RequestFailed)?
            .text()
            .await
            .map_err(Error::RequestFailed)?;
        self.parse_response(&body)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, payload: Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let body = self
            .http_client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&payload)
            .send()
            .await
            .map_err(Error::RequestFailed)?
            .text()
            .await
            .map_err(Error::RequestFailed)?;
        self.parse_response(&body)
    }

    /// Fetches every open position on the account, engine-opened or not.
    ///
    /// Corresponds to `GET /api/positions`.
    pub async fn get_open_positions(&self, account: AccountId) -> Result<Vec<BridgePosition>> {
        self.get_json(&format!("/api/positions?account={}", account))
            .await
    }

    /// Fetches the account balance/equity/free-margin snapshot.
    ///
    /// Corresponds to `GET /api/accounts/{id}`.
    pub async fn get_account_state(&self, account: AccountId) -> Result<BridgeAccount> {
        self.get_json(&format!("/api/accounts/{}", account)).await
    }

    /// Places a market order and waits for the fill acknowledgement.
    ///
    /// Corresponds to `POST /api/orders`.
    pub async fn place_market_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let payload = json!({
            "account": order.account.0,
            "symbol": order.symbol.0,
            "direction": direction_str(order.direction),
            "volume": order.volume,
            "stop_loss": order.stop_loss,
            "take_profit": order.take_profit,
            "stack_index": order.stack_index,
            "comment": order.source_id,
        });
        self.post_json("/api/orders", payload).await
    }

    /// Updates the stop-loss/take-profit of an open position.
    ///
    /// Corresponds to `POST /api/positions/{ticket}/modify`.
    pub async fn modify_position(
        &self,
        account: AccountId,
        ticket: u64,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<()> {
        let payload = json!({
            "account": account.0,
            "stop_loss": stop_loss,
            "take_profit": take_profit,
        });
        let _: Value = self
            .post_json(&format!("/api/positions/{}/modify", ticket), payload)
            .await?;
        Ok(())
    }

    /// Closes part or all of an open position at market.
    ///
    /// Corresponds to `POST /api/positions/{ticket}/close`.
    pub async fn close_position(
        &self,
        account: AccountId,
        ticket: u64,
        volume: Decimal,
    ) -> Result<CloseAck> {
        let payload = json!({
            "account": account.0,
            "volume": volume,
        });
        self.post_json(&format!("/api/positions/{}/close", ticket), payload)
            .await
    }

    /// Fetches the most recently closed bar for a symbol/timeframe.
    ///
    /// Corresponds to `GET /api/bars/latest`.
    pub async fn latest_bar(&self, symbol: &Symbol, timeframe: &str) -> Result<BridgeBar> {
        self.get_json(&format!(
            "/api/bars/latest?symbol={}&timeframe={}",
            symbol.0, timeframe
        ))
        .await
    }

    /// Polls the strategy layer's signal queue. `None` when no signal is
    /// pending this cycle.
    ///
    /// Corresponds to `GET /api/signals/next`.
    pub async fn poll_signal(
        &self,
        account: AccountId,
        symbol: &Symbol,
    ) -> Result<Option<BridgeSignal>> {
        let url = format!(
            "{}/api/signals/next?account={}&symbol={}",
            self.base_url, account, symbol.0
        );
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(Error::RequestFailed)?;

        // An empty queue is reported as 204 No Content.
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await.map_err(Error::RequestFailed)?;
        Ok(Some(self.parse_response(&body)?))
    }
}

/// The wire form of a direction.
pub fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "buy",
        Direction::Sell => "sell",
    }
}

/// Parses a wire direction, rejecting anything but "buy"/"sell".
pub fn parse_direction(raw: &str) -> Result<Direction> {
    match raw {
        "buy" => Ok(Direction::Buy),
        "sell" => Ok(Direction::Sell),
        other => Err(Error::MalformedData(format!(
            "unknown direction '{other}'"
        ))),
    }
}
