/// OAuth sign-in with Google and piwo.org
///
/// Both providers use the authorization-code flow. The CSRF state travels
/// in a short-lived cookie and is compared on the callback.

use crate::config::{GoogleOAuthConfig, OAuthConfig, PiwoOAuthConfig};
use ispindel_shared::accounts::ExternalProfile;
use ispindel_shared::models::ExternalId;
use oauth2::basic::{BasicErrorResponseType, BasicTokenType};
use oauth2::url::Url;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, EmptyExtraTokenFields,
    EndpointNotSet, EndpointSet, RedirectUrl, RevocationErrorResponseType, Scope,
    StandardErrorResponse, StandardRevocableToken, StandardTokenIntrospectionResponse,
    StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::Deserialize;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// OAuth2 client with the authorization and token endpoints set
pub type OAuth2Client = Client<
    StandardErrorResponse<BasicErrorResponseType>,
    StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>,
    StandardTokenIntrospectionResponse<EmptyExtraTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<RevocationErrorResponseType>,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid OAuth configuration: {0}")]
    Config(String),

    #[error("code exchange failed: {0}")]
    Exchange(String),

    #[error("failed to fetch user profile: {0}")]
    Profile(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    Piwo,
}

impl ProviderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::Piwo => "piwo.org",
        }
    }
}

#[derive(Clone)]
pub struct OAuthProvider {
    kind: ProviderKind,
    client: OAuth2Client,
    scopes: Vec<Scope>,
    userinfo_url: String,
}

fn build_client(
    client_id: &str,
    client_secret: &str,
    auth_url: &str,
    token_url: &str,
    redirect_url: &str,
) -> Result<OAuth2Client, OAuthError> {
    let auth_url = AuthUrl::new(auth_url.to_string()).map_err(|e| OAuthError::Config(e.to_string()))?;
    let token_url = TokenUrl::new(token_url.to_string()).map_err(|e| OAuthError::Config(e.to_string()))?;
    let redirect_url =
        RedirectUrl::new(redirect_url.to_string()).map_err(|e| OAuthError::Config(e.to_string()))?;

    Ok(Client::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url))
}

impl OAuthProvider {
    pub fn google(config: &GoogleOAuthConfig) -> Result<Self, OAuthError> {
        Ok(Self {
            kind: ProviderKind::Google,
            client: build_client(
                &config.client_id,
                &config.client_secret,
                GOOGLE_AUTH_URL,
                GOOGLE_TOKEN_URL,
                &config.redirect_url,
            )?,
            scopes: vec![
                Scope::new("https://www.googleapis.com/auth/userinfo.email".to_string()),
                Scope::new("https://www.googleapis.com/auth/userinfo.profile".to_string()),
            ],
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        })
    }

    pub fn piwo(config: &PiwoOAuthConfig) -> Result<Self, OAuthError> {
        Ok(Self {
            kind: ProviderKind::Piwo,
            client: build_client(
                &config.client_id,
                &config.client_secret,
                &config.auth_url,
                &config.token_url,
                &config.redirect_url,
            )?,
            scopes: vec![Scope::new("profile".to_string()), Scope::new("email".to_string())],
            userinfo_url: config.userinfo_url.clone(),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Provider login URL and the CSRF state it embeds
    pub fn authorize_url(&self) -> (Url, CsrfToken) {
        self.client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned())
            .url()
    }

    /// Trades the callback code for an access token
    pub async fn exchange(&self, code: String, http: &reqwest::Client) -> Result<String, OAuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(http)
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        Ok(token.access_token().secret().clone())
    }

    pub async fn fetch_profile(
        &self,
        access_token: &str,
        http: &reqwest::Client,
    ) -> Result<ExternalProfile, OAuthError> {
        let request = http.get(&self.userinfo_url).bearer_auth(access_token);

        let profile = match self.kind {
            ProviderKind::Google => request
                .send()
                .await?
                .error_for_status()?
                .json::<GoogleUser>()
                .await?
                .into(),
            ProviderKind::Piwo => request
                .send()
                .await?
                .error_for_status()?
                .json::<PiwoUser>()
                .await?
                .into(),
        };

        Ok(profile)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    picture: Option<String>,
}

impl From<GoogleUser> for ExternalProfile {
    fn from(user: GoogleUser) -> Self {
        ExternalProfile {
            external_id: ExternalId::Google(user.id),
            email: user.email,
            name: user.name,
            picture: user.picture.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PiwoUser {
    id: i64,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    photo_url: Option<String>,
}

impl From<PiwoUser> for ExternalProfile {
    fn from(user: PiwoUser) -> Self {
        ExternalProfile {
            external_id: ExternalId::Piwo(user.id),
            email: user.email,
            name: user.name,
            picture: user.photo_url.filter(|p| !p.is_empty()),
        }
    }
}

/// The providers enabled by configuration
#[derive(Clone, Default)]
pub struct OAuthProviders {
    pub google: Option<OAuthProvider>,
    pub piwo: Option<OAuthProvider>,
}

impl OAuthProviders {
    pub fn from_config(config: &OAuthConfig) -> Result<Self, OAuthError> {
        Ok(Self {
            google: config.google.as_ref().map(OAuthProvider::google).transpose()?,
            piwo: config.piwo.as_ref().map(OAuthProvider::piwo).transpose()?,
        })
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&OAuthProvider> {
        match kind {
            ProviderKind::Google => self.google.as_ref(),
            ProviderKind::Piwo => self.piwo.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piwo_config() -> PiwoOAuthConfig {
        PiwoOAuthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            auth_url: "https://piwo.example/oauth/authorize".to_string(),
            token_url: "https://piwo.example/oauth/token".to_string(),
            redirect_url: "http://localhost:49330/auth/piwo/callback".to_string(),
            userinfo_url: "https://piwo.example/api/core/me".to_string(),
        }
    }

    #[test]
    fn test_authorize_url_contains_state_and_scopes() {
        let provider = OAuthProvider::piwo(&piwo_config()).unwrap();
        let (url, state) = provider.authorize_url();

        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("state".to_string(), state.secret().clone())));
        assert!(query.contains(&("client_id".to_string(), "client".to_string())));
        assert!(query.contains(&("scope".to_string(), "profile email".to_string())));
        assert_eq!(url.host_str(), Some("piwo.example"));
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let mut config = piwo_config();
        config.auth_url = "not a url".to_string();
        assert!(matches!(OAuthProvider::piwo(&config), Err(OAuthError::Config(_))));
    }

    #[test]
    fn test_profiles_from_json() {
        let google: GoogleUser = serde_json::from_str(
            r#"{"id":"1089","email":"a@example.com","verified_email":true,"name":"A","picture":""}"#,
        )
        .unwrap();
        let profile = ExternalProfile::from(google);
        assert_eq!(profile.external_id, ExternalId::Google("1089".to_string()));
        assert_eq!(profile.picture, None);

        let piwo: PiwoUser =
            serde_json::from_str(r#"{"id":42,"email":"b@example.com","name":"B","photo_url":"https://x/p.png"}"#)
                .unwrap();
        let profile = ExternalProfile::from(piwo);
        assert_eq!(profile.external_id, ExternalId::Piwo(42));
        assert_eq!(profile.picture.as_deref(), Some("https://x/p.png"));
    }

    #[test]
    fn test_providers_from_empty_config() {
        let providers = OAuthProviders::from_config(&OAuthConfig::default()).unwrap();
        assert!(providers.get(ProviderKind::Google).is_none());
        assert!(providers.get(ProviderKind::Piwo).is_none());
    }
}
