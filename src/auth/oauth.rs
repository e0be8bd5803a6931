//! OAuth 1.0a signing and the three-legged handshake
//!
//! Requests are signed with the `PLAINTEXT` method, which relies on TLS for
//! confidentiality: the signature is the percent-encoded consumer secret and
//! token secret joined by `&`.

use crate::auth::Credential;
use crate::config::OAuthConfig;
use crate::{AuthStage, DiggerError, Result};
use std::io::{BufRead, Write};
use url::Url;

/// Endpoints of the three-legged flow
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub request_token_url: String,
    pub authorize_url: String,
    pub access_token_url: String,
}

/// Registered application identity
#[derive(Clone)]
pub struct OAuthConsumer {
    pub consumer_key: String,
    consumer_secret: String,
    pub endpoints: OAuthEndpoints,
}

impl std::fmt::Debug for OAuthConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConsumer")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl OAuthConsumer {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        endpoints: OAuthEndpoints,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            endpoints,
        }
    }

    pub fn from_config(config: &OAuthConfig) -> Self {
        Self::new(
            config.consumer_key.clone(),
            config.consumer_secret.clone(),
            OAuthEndpoints {
                request_token_url: config.request_token_url.clone(),
                authorize_url: config.authorize_url.clone(),
                access_token_url: config.access_token_url.clone(),
            },
        )
    }

    /// Builds the `Authorization` header value for one request
    ///
    /// # Arguments
    ///
    /// * `token` - Token key and secret, if the request is made on behalf of a user
    /// * `extra` - Additional protocol parameters (`oauth_callback`, `oauth_verifier`)
    pub fn authorization_header(
        &self,
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
    ) -> String {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.header_with(token, extra, &nonce, &timestamp)
    }

    fn header_with(
        &self,
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let token_secret = token.map(|(_, secret)| secret).unwrap_or("");
        let signature = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(token_secret)
        );

        let mut params: Vec<(&str, &str)> = vec![
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature", signature.as_str()),
            ("oauth_signature_method", "PLAINTEXT"),
            ("oauth_timestamp", timestamp),
        ];
        if let Some((key, _)) = token {
            params.push(("oauth_token", key));
        }
        params.push(("oauth_version", "1.0"));
        params.extend_from_slice(extra);

        let fields: Vec<String> = params
            .iter()
            .map(|(name, value)| format!("{}=\"{}\"", name, percent_encode(value)))
            .collect();

        format!("OAuth {}", fields.join(", "))
    }

    /// Header for a request signed with the access credential
    pub fn sign(&self, credential: &Credential) -> String {
        self.authorization_header(
            Some((
                credential.access_token.as_str(),
                credential.token_secret.as_str(),
            )),
            &[],
        )
    }
}

/// RFC 3986 percent-encoding (unreserved characters pass through)
pub fn percent_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}

/// Source of the verification code a human copies from the authorize page
pub trait VerifierPrompt: Send + Sync {
    /// Shows `authorize_url` to the user and returns the code they enter
    fn verifier(&self, authorize_url: &str) -> std::io::Result<String>;
}

impl<F> VerifierPrompt for F
where
    F: Fn(&str) -> std::io::Result<String> + Send + Sync,
{
    fn verifier(&self, authorize_url: &str) -> std::io::Result<String> {
        self(authorize_url)
    }
}

/// Terminal prompt: prints the URL to stderr and reads one line from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl VerifierPrompt for StdinPrompt {
    fn verifier(&self, authorize_url: &str) -> std::io::Result<String> {
        let mut stderr = std::io::stderr();
        writeln!(stderr, "Open this URL in a browser and authorize the application:")?;
        writeln!(stderr, "  {}", authorize_url)?;
        write!(stderr, "Verification code: ")?;
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Temporary token pair handed out by the request-token endpoint
#[derive(Debug)]
struct TokenPair {
    token: String,
    secret: String,
}

fn parse_token_response(body: &str) -> Option<TokenPair> {
    let mut token = None;
    let mut secret = None;
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "oauth_token" => token = Some(value.into_owned()),
            "oauth_token_secret" => secret = Some(value.into_owned()),
            _ => {}
        }
    }

    match (token, secret) {
        (Some(token), Some(secret)) if !token.is_empty() && !secret.is_empty() => {
            Some(TokenPair { token, secret })
        }
        _ => None,
    }
}

async fn token_exchange(
    request: reqwest::RequestBuilder,
    stage: AuthStage,
) -> Result<TokenPair> {
    let response = request
        .send()
        .await
        .map_err(|e| DiggerError::auth(stage, e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| DiggerError::auth(stage, e.to_string()))?;

    if !status.is_success() {
        return Err(DiggerError::auth(
            stage,
            format!("HTTP {}: {}", status.as_u16(), body.trim()),
        ));
    }

    parse_token_response(&body)
        .ok_or_else(|| DiggerError::auth(stage, "response did not contain a token pair"))
}

/// Runs the interactive three-legged handshake
///
/// Blocks on `prompt` while the user authorizes the application, so this
/// belongs to first-run setup, never to an unattended scrape.
pub async fn authorize(
    consumer: &OAuthConsumer,
    client: &reqwest::Client,
    prompt: &dyn VerifierPrompt,
) -> Result<Credential> {
    tracing::info!("Requesting OAuth request token");
    let header = consumer.authorization_header(None, &[("oauth_callback", "oob")]);
    let request_token = token_exchange(
        client
            .get(&consumer.endpoints.request_token_url)
            .header(reqwest::header::AUTHORIZATION, header),
        AuthStage::RequestToken,
    )
    .await?;

    let mut authorize_url = Url::parse(&consumer.endpoints.authorize_url)
        .map_err(|e| DiggerError::auth(AuthStage::Authorize, e.to_string()))?;
    authorize_url
        .query_pairs_mut()
        .append_pair("oauth_token", &request_token.token);

    let verifier = prompt
        .verifier(authorize_url.as_str())
        .map_err(|e| DiggerError::auth(AuthStage::Authorize, e.to_string()))?;
    let verifier = verifier.trim();
    if verifier.is_empty() {
        return Err(DiggerError::auth(
            AuthStage::Authorize,
            "no verification code entered",
        ));
    }

    tracing::info!("Exchanging verifier for access token");
    let header = consumer.authorization_header(
        Some((request_token.token.as_str(), request_token.secret.as_str())),
        &[("oauth_verifier", verifier)],
    );
    let access = token_exchange(
        client
            .post(&consumer.endpoints.access_token_url)
            .header(reqwest::header::AUTHORIZATION, header),
        AuthStage::AccessToken,
    )
    .await?;

    Ok(Credential::new(access.token, access.secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_consumer() -> OAuthConsumer {
        OAuthConsumer::new(
            "ckey",
            "c secret",
            OAuthEndpoints {
                request_token_url: "https://api.example.com/oauth/request_token".to_string(),
                authorize_url: "https://www.example.com/oauth/authorize".to_string(),
                access_token_url: "https://api.example.com/oauth/access_token".to_string(),
            },
        )
    }

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("abc-._~"), "abc-._~");
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("a&b=c"), "a%26b%3Dc");
        assert_eq!(percent_encode("x*y"), "x%2Ay");
    }

    #[test]
    fn test_plaintext_signature_without_token() {
        let header = test_consumer().header_with(None, &[("oauth_callback", "oob")], "n", "1");

        assert!(header.starts_with("OAuth "));
        assert!(header.contains(r#"oauth_consumer_key="ckey""#));
        assert!(header.contains(r#"oauth_signature_method="PLAINTEXT""#));
        // "c%20secret&" encoded once more for the header
        assert!(header.contains(r#"oauth_signature="c%2520secret%26""#));
        assert!(header.contains(r#"oauth_callback="oob""#));
        assert!(!header.contains("oauth_token="));
    }

    #[test]
    fn test_signature_includes_token_secret() {
        let header = test_consumer().header_with(Some(("tok", "sec")), &[], "n", "1");

        assert!(header.contains(r#"oauth_token="tok""#));
        assert!(header.contains(r#"oauth_signature="c%2520secret%26sec""#));
        assert!(header.contains(r#"oauth_nonce="n""#));
        assert!(header.contains(r#"oauth_timestamp="1""#));
    }

    #[test]
    fn test_nonce_is_fresh() {
        let consumer = test_consumer();
        let a = consumer.authorization_header(None, &[]);
        let b = consumer.authorization_header(None, &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_token_response() {
        let pair = parse_token_response(
            "oauth_token=abc&oauth_token_secret=d%26f&oauth_callback_confirmed=true",
        )
        .unwrap();
        assert_eq!(pair.token, "abc");
        assert_eq!(pair.secret, "d&f");

        assert!(parse_token_response("oauth_token=abc").is_none());
        assert!(parse_token_response("error=denied").is_none());
    }

    #[test]
    fn test_consumer_debug_redacts_secret() {
        let rendered = format!("{:?}", test_consumer());
        assert!(!rendered.contains("c secret"));
    }
}
