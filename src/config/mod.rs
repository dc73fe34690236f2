use crate::error::{ReportError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure (`config.toml`)
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub current_tenant: Option<String>,

    /// Mailbox that receives TLS-RPT reports; `me` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailbox: Option<String>,

    /// Explicit 7-Zip executable, probed before any other location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_zip_path: Option<PathBuf>,
}

/// Tenant profile used to authenticate against Microsoft Graph
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    DeviceCode,
    ClientCredentials,
}

/// Token cache structure
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
}

#[derive(Deserialize, Serialize, Default)]
struct TenantsFile {
    #[serde(default)]
    tenants: Vec<TenantConfig>,
}

/// Configuration manager
#[derive(Clone, Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "mtasts-report", "mtasts-report")
            .ok_or_else(|| {
                ReportError::ConfigError("Failed to determine config directory".into())
            })?;

        Self::with_dir(project_dirs.config_dir())
    }

    /// Use an explicit config directory, creating it if needed
    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = dir.as_ref().to_path_buf();
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }
        Ok(Self { config_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    pub fn token_cache_file(&self, tenant_name: &str) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.token", tenant_name))
    }

    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| ReportError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();
        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;
        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    fn save_tenants(&self, tenants: Vec<TenantConfig>) -> Result<()> {
        let contents = toml::to_string_pretty(&TenantsFile { tenants }).map_err(|e| {
            ReportError::ConfigError(format!("Failed to serialize tenants: {}", e))
        })?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or replace a tenant profile by name
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| !t.name.eq_ignore_ascii_case(&tenant.name));
        tenants.push(tenant);
        self.save_tenants(tenants)
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ReportError::TenantNotFound(name.to_string()))
    }

    /// Resolve an explicit tenant name, or fall back to the active tenant
    pub fn resolve_tenant(&self, name: Option<&str>) -> Result<TenantConfig> {
        if let Some(name) = name {
            return self.get_tenant(name);
        }

        match self.load_config()?.current_tenant {
            Some(current) => self.get_tenant(&current),
            None => Err(ReportError::ConfigError(
                "No active tenant. Run 'mtasts-report login <NAME> --tenant-id .. --client-id ..' first".into(),
            )),
        }
    }

    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        let tenant = self.get_tenant(tenant_name)?;
        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant.name);
        self.save_config(&config)
    }

    pub fn save_token(&self, tenant_name: &str, token: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name), contents)?;
        Ok(())
    }

    /// Load a cached token, rejecting one that has expired
    pub fn load_token(&self, tenant_name: &str) -> Result<TokenCache> {
        let token_path = self.token_cache_file(tenant_name);
        if !token_path.exists() {
            return Err(ReportError::TokenNotFound);
        }

        let contents = fs::read_to_string(token_path)?;
        let token: TokenCache = serde_json::from_str(&contents)?;

        if token.expires_at < chrono::Utc::now() {
            return Err(ReportError::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    pub fn delete_token(&self, tenant_name: &str) -> Result<()> {
        let token_path = self.token_cache_file(tenant_name);
        if token_path.exists() {
            fs::remove_file(token_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tenant(name: &str) -> TenantConfig {
        TenantConfig {
            name: name.to_string(),
            tenant_id: "00000000-0000-0000-0000-000000000001".into(),
            client_id: "00000000-0000-0000-0000-000000000002".into(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
        }
    }

    #[test]
    fn test_missing_files_give_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        assert_eq!(manager.load_config().unwrap(), Config::default());
        assert!(manager.load_tenants().unwrap().is_empty());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        let config = Config {
            current_tenant: None,
            mailbox: Some("tlsrpt@contoso.com".into()),
            seven_zip_path: Some(PathBuf::from("/opt/7zip/7zz")),
        };
        manager.save_config(&config).unwrap();
        assert_eq!(manager.load_config().unwrap(), config);
    }

    #[test]
    fn test_add_tenant_replaces_same_name() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        manager.add_tenant(tenant("CONTOSO")).unwrap();

        let mut updated = tenant("contoso");
        updated.description = Some("Report mailbox tenant".into());
        manager.add_tenant(updated).unwrap();

        let tenants = manager.load_tenants().unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].description.as_deref(), Some("Report mailbox tenant"));
    }

    #[test]
    fn test_resolve_tenant_uses_active() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        assert!(matches!(
            manager.resolve_tenant(None),
            Err(ReportError::ConfigError(_))
        ));

        manager.add_tenant(tenant("FABRIKAM")).unwrap();
        manager.set_active_tenant("fabrikam").unwrap();
        assert_eq!(manager.resolve_tenant(None).unwrap().name, "FABRIKAM");
        assert!(matches!(
            manager.resolve_tenant(Some("other")),
            Err(ReportError::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        let token = TokenCache {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: chrono::Utc::now() - chrono::Duration::minutes(5),
            tenant_id: "t".into(),
        };
        manager.save_token("CONTOSO", &token).unwrap();
        assert!(matches!(
            manager.load_token("CONTOSO"),
            Err(ReportError::AuthError(_))
        ));

        manager.delete_token("CONTOSO").unwrap();
        assert!(matches!(
            manager.load_token("CONTOSO"),
            Err(ReportError::TokenNotFound)
        ));
    }
}
