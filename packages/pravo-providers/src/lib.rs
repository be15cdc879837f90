pub mod embedding;
pub mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auth_headers_include_bearer_token_and_defaults() {
		let mut defaults = Map::new();

		defaults.insert("x-tenant".to_string(), Value::String("court".to_string()));

		let headers = auth_headers("secret", &defaults).expect("Headers must build.");

		assert_eq!(headers.get(AUTHORIZATION).expect("Missing authorization."), "Bearer secret");
		assert_eq!(headers.get("x-tenant").expect("Missing default header."), "court");
	}

	#[test]
	fn auth_headers_reject_non_string_defaults() {
		let mut defaults = Map::new();

		defaults.insert("x-retries".to_string(), Value::from(3));

		let err = auth_headers("secret", &defaults).expect_err("Expected header error.");

		assert!(err.to_string().contains("x-retries"), "Unexpected error: {err}");
	}
}
