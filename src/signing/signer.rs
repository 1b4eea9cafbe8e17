use crate::error::{BotError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// API credentials for signed endpoints
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    secret: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"***")
            .field("secret", &"***")
            .finish()
    }
}

impl ApiCredentials {
    pub fn new(api_key: String, secret: String) -> Self {
        Self { api_key, secret }
    }
}

/// HMAC-SHA256 query-string signer for USER_DATA / TRADE endpoints
#[derive(Debug, Clone)]
pub struct QuerySigner {
    credentials: ApiCredentials,
    recv_window_ms: u64,
}

impl QuerySigner {
    pub fn new(credentials: ApiCredentials, recv_window_ms: u64) -> Self {
        Self {
            credentials,
            recv_window_ms,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.credentials.api_key
    }

    /// Current timestamp in milliseconds
    fn timestamp_ms() -> Result<u128> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .map_err(|e| BotError::Signature(format!("system clock before epoch: {}", e)))
    }

    /// Hex-encoded HMAC-SHA256 of `payload`
    pub fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret.as_bytes())
            .map_err(|e| BotError::Signature(format!("HMAC init failed: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Encode params, append recvWindow/timestamp and the signature
    pub fn signed_query(&self, params: &[(&str, String)]) -> Result<String> {
        let timestamp = Self::timestamp_ms()?;
        let mut query = encode_params(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms, timestamp
        ));
        let signature = self.sign(&query)?;
        query.push_str("&signature=");
        query.push_str(&signature);
        Ok(query)
    }
}

/// `k=v&k=v`; values here are symbols, enums and decimals, never reserved characters
pub fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_reference_vector() {
        // Reference pair from the exchange's public signing documentation
        let signer = QuerySigner::new(
            ApiCredentials::new(
                "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A".to_string(),
                "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".to_string(),
            ),
            5000,
        );
        let payload = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            signer.sign(payload).expect("signing should succeed"),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn signed_query_appends_signature_last() {
        let signer = QuerySigner::new(ApiCredentials::new("k".into(), "s".into()), 5000);
        let query = signer
            .signed_query(&[("symbol", "BTCUSDT".to_string())])
            .expect("query should sign");
        assert!(query.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        let (_, signature) = query.rsplit_once("&signature=").expect("signature present");
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = ApiCredentials::new("key".into(), "secret".into());
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("\"secret\""));
        assert!(!printed.contains("\"key\""));
    }
}
