use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{ReportError, Result};
use crate::graph::auth::{GraphAuth, REQUIRED_SCOPE};
use crate::tui::prompts;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant profile name (e.g. CONTOSO)
    pub name: String,

    /// Azure AD tenant ID; creates or updates the profile together with --client-id
    #[arg(long, requires = "client_id")]
    pub tenant_id: Option<String>,

    /// Application (client) ID of the app registration
    #[arg(long, requires = "tenant_id")]
    pub client_id: Option<String>,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    pub client_secret: Option<String>,

    /// Use client credentials flow instead of device code
    #[arg(long)]
    pub client_credentials: bool,

    /// Remember this mailbox UPN as the default report mailbox
    #[arg(long)]
    pub mailbox: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant profile name (defaults to the active tenant)
    pub name: Option<String>,
}

fn profile_from_args(args: &LoginArgs) -> Option<TenantConfig> {
    let (tenant_id, client_id) = (args.tenant_id.clone()?, args.client_id.clone()?);
    let auth_type = if args.client_credentials {
        AuthType::ClientCredentials
    } else {
        AuthType::DeviceCode
    };

    Some(TenantConfig {
        name: args.name.clone(),
        tenant_id,
        client_id,
        client_secret: args.client_secret.clone(),
        auth_type,
        description: None,
    })
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    let tenant = match profile_from_args(&args) {
        Some(tenant) => {
            if tenant.auth_type == AuthType::ClientCredentials && tenant.client_secret.is_none() {
                return Err(ReportError::ConfigError(
                    "--client-credentials needs --client-secret".into(),
                ));
            }
            config_manager.add_tenant(tenant.clone())?;
            tenant
        }
        None => config_manager.get_tenant(&args.name)?,
    };

    GraphAuth::new(config_manager.clone()).login(&tenant).await?;
    config_manager.set_active_tenant(&tenant.name)?;

    let mut config = config_manager.load_config()?;
    if let Some(mailbox) = args.mailbox {
        config.mailbox = Some(mailbox);
        config_manager.save_config(&config)?;
    }

    prompts::success(&format!("Logged in to tenant '{}'", tenant.name.bold()));
    if tenant.auth_type == AuthType::ClientCredentials && config.mailbox.is_none() {
        prompts::warning(
            "Application logins cannot read 'me'; pass --mailbox <UPN> here or to 'run'",
        );
    }
    prompts::info(&format!(
        "The app registration needs the {} permission",
        REQUIRED_SCOPE.bold()
    ));

    Ok(())
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let tenant = config_manager.resolve_tenant(args.name.as_deref())?;

    GraphAuth::new(config_manager).logout(&tenant.name)?;
    prompts::success(&format!("Logged out from tenant '{}'", tenant.name));

    Ok(())
}
