use crate::config::{AuthType, ConfigManager, TenantConfig, TokenCache};
use crate::error::{ReportError, Result};
use crate::tui::prompts;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields,
    Scope, TokenResponse, TokenUrl, basic::BasicClient, reqwest::async_http_client,
};
use std::time::Duration;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Permission the app registration needs to read report attachments
pub const REQUIRED_SCOPE: &str = "Mail.Read";

pub struct GraphAuth {
    config_manager: ConfigManager,
}

struct TenantEndpoints {
    auth: AuthUrl,
    token: TokenUrl,
}

fn endpoints(tenant_id: &str) -> Result<TenantEndpoints> {
    let auth = AuthUrl::new(format!(
        "{}/{}/oauth2/v2.0/authorize",
        MICROSOFT_AUTHORITY, tenant_id
    ))
    .map_err(|e| ReportError::AuthError(format!("Invalid auth URL: {}", e)))?;

    let token = TokenUrl::new(format!(
        "{}/{}/oauth2/v2.0/token",
        MICROSOFT_AUTHORITY, tenant_id
    ))
    .map_err(|e| ReportError::AuthError(format!("Invalid token URL: {}", e)))?;

    Ok(TenantEndpoints { auth, token })
}

fn expiry_from(expires_in: Option<Duration>) -> Result<chrono::DateTime<chrono::Utc>> {
    let lifetime = chrono::Duration::from_std(expires_in.unwrap_or(Duration::from_secs(3600)))
        .map_err(|e| ReportError::AuthError(format!("Invalid token lifetime: {}", e)))?;
    Ok(chrono::Utc::now() + lifetime)
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Authenticate with whichever flow the tenant profile is set up for
    pub async fn login(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        match tenant_config.auth_type {
            AuthType::DeviceCode => self.login_device_code(tenant_config).await,
            AuthType::ClientCredentials => self.login_client_credentials(tenant_config).await,
        }
    }

    /// Interactive device code flow (delegated access to the signed-in mailbox)
    pub async fn login_device_code(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        prompts::info(&format!(
            "Starting device code authentication for tenant '{}'...",
            tenant_config.name
        ));

        let urls = endpoints(&tenant_config.tenant_id)?;
        let device_auth_url = DeviceAuthorizationUrl::new(format!(
            "{}/{}/oauth2/v2.0/devicecode",
            MICROSOFT_AUTHORITY, tenant_config.tenant_id
        ))
        .map_err(|e| ReportError::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(tenant_config.client_id.clone()),
            None,
            urls.auth,
            Some(urls.token),
        )
        .set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| ReportError::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    ReportError::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        println!("\n  Please visit: {}", details.verification_uri().as_str());
        println!("  Enter code:   {}\n", details.user_code().secret());

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| ReportError::AuthError(format!("Token exchange failed: {}", e)))?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: expiry_from(token.expires_in())?,
            tenant_id: tenant_config.tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        tracing::debug!(
            "Token saved to {:?}",
            self.config_manager.token_cache_file(&tenant_config.name)
        );

        Ok(token_cache)
    }

    /// Non-interactive client credentials flow (application access, needs an explicit mailbox)
    pub async fn login_client_credentials(
        &self,
        tenant_config: &TenantConfig,
    ) -> Result<TokenCache> {
        let client_secret = tenant_config.client_secret.as_ref().ok_or_else(|| {
            ReportError::AuthError("Client secret required for client credentials flow".into())
        })?;

        prompts::info(&format!(
            "Authenticating with client credentials for tenant '{}'...",
            tenant_config.name
        ));

        let urls = endpoints(&tenant_config.tenant_id)?;
        let client = BasicClient::new(
            ClientId::new(tenant_config.client_id.clone()),
            Some(ClientSecret::new(client_secret.clone())),
            urls.auth,
            Some(urls.token),
        );

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                ReportError::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: None,
            expires_at: expiry_from(token.expires_in())?,
            tenant_id: tenant_config.tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;

        Ok(token_cache)
    }

    /// Cached access token; an expired one asks the operator to log in again
    pub async fn get_access_token(&self, tenant_name: &str) -> Result<String> {
        match self.config_manager.load_token(tenant_name) {
            Ok(token) => Ok(token.access_token),
            Err(ReportError::AuthError(_)) => Err(ReportError::TokenNotFound),
            Err(e) => Err(e),
        }
    }

    pub fn logout(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_token(tenant_name)
    }
}
