use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub default_due_days: i64,
    /// How often the overdue sweep runs.
    pub overdue_check_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("CRM_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("CRM_SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            billing: BillingConfig {
                default_due_days: env::var("CRM_INVOICE_DUE_DAYS")
                    .ok()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(30),
                overdue_check_secs: env::var("CRM_OVERDUE_CHECK_SECS")
                    .ok()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(3600),
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
