use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::store::{StoreError, StoreResult};

/// Postgres "undefined_table" and PostgREST "relation not in schema cache".
const MISSING_TABLE_CODES: [&str; 2] = ["42P01", "PGRST205"];

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> StoreResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| StoreError::Request(format!("invalid api key header: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // PostgREST evaluates row-level policies against the caller's JWT;
        // without one the anon key acts as the bearer.
        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|e| StoreError::Request(format!("invalid authorization header: {}", e)))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> StoreResult<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> StoreResult<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);
            return Err(classify_error(status, &error_text));
        }

        // DELETE/PATCH without `return=representation` reply with an empty body.
        let bytes = response.bytes().await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let data = if bytes.is_empty() {
            serde_json::from_value(Value::Null)
                .or_else(|_| serde_json::from_value(Value::Array(Vec::new())))?
        } else {
            serde_json::from_slice::<T>(&bytes)?
        };
        Ok(data)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn classify_error(status: StatusCode, body: &str) -> StoreError {
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(str::to_string));

    if let Some(code) = code.as_deref() {
        if MISSING_TABLE_CODES.contains(&code) {
            return StoreError::MissingTable(body.to_string());
        }
        if code == "42501" {
            return StoreError::PermissionDenied(body.to_string());
        }
    }

    match status.as_u16() {
        401 | 403 => StoreError::PermissionDenied(body.to_string()),
        404 => StoreError::MissingTable(body.to_string()),
        _ => StoreError::Api {
            status: status.as_u16(),
            message: body.to_string(),
        },
    }
}
