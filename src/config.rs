use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// リセットトークン署名用シークレット（16バイト以上）
    pub reset_token_secret: SecretBox<String>,
    #[serde(default = "default_reset_token_ttl_secs")]
    pub reset_token_ttl_secs: i64,
    #[serde(default)]
    pub reset_url_base: Option<String>,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,
}

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_RESET_TOKEN_TTL_SECS: i64 = 1800;

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_reset_token_ttl_secs() -> i64 {
    DEFAULT_RESET_TOKEN_TTL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
