use async_trait::async_trait;

use crate::error::AppError;

/// メール送信の抽象
///
/// メールのトランスポートはこのcrateの関心外のため、呼び出し側が
/// 実装を注入する。リセットURLの組み立ては呼び出し側
/// （`PasswordResetService`）が行い、Mailerは宛先と本文の送達のみを担う。
#[async_trait]
pub trait Mailer: Send + Sync {
    /// パスワードリセットメールを送信
    async fn send_password_reset_email(
        &self,
        to: &str,
        reset_url: &str,
    ) -> Result<(), AppError>;
}

/// 開発環境向けMailer（ログ出力のみ、送信しない）
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    /// # Note
    /// リセットURLにはトークンが含まれるため、本番環境でこの実装を
    /// 使用してはならない
    async fn send_password_reset_email(
        &self,
        to: &str,
        reset_url: &str,
    ) -> Result<(), AppError> {
        tracing::info!(to = %to, "パスワードリセットメール送信（開発モード）");
        tracing::info!("リセットURL: {}", reset_url);
        Ok(())
    }
}

#[cfg(feature = "email")]
mod smtp {
    use async_trait::async_trait;
    use lettre::message::Mailbox;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
    use secrecy::ExposeSecret;

    use crate::config::Config;
    use crate::error::AppError;

    use super::Mailer;

    /// SMTP経由のMailer（lettre）
    #[derive(Clone)]
    pub struct SmtpMailer {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    }

    impl SmtpMailer {
        /// 設定からSMTP Mailerを構築
        ///
        /// smtp_host / smtp_username / smtp_password / smtp_from_address が
        /// すべて設定されている必要がある。
        pub fn from_config(config: &Config) -> Result<Self, AppError> {
            let host = config
                .smtp_host
                .as_deref()
                .ok_or_else(|| AppError::Validation("smtp_host は必須です".to_string()))?;
            let username = config
                .smtp_username
                .as_ref()
                .ok_or_else(|| AppError::Validation("smtp_username は必須です".to_string()))?;
            let password = config
                .smtp_password
                .as_ref()
                .ok_or_else(|| AppError::Validation("smtp_password は必須です".to_string()))?;
            let from = config
                .smtp_from_address
                .as_deref()
                .ok_or_else(|| {
                    AppError::Validation("smtp_from_address は必須です".to_string())
                })?
                .parse::<Mailbox>()
                .map_err(|e| {
                    AppError::Validation(format!("smtp_from_address が不正です: {e}"))
                })?;

            let credentials = Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            );
            let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
                .port(config.smtp_port)
                .credentials(credentials)
                .build();

            Ok(Self { transport, from })
        }
    }

    #[async_trait]
    impl Mailer for SmtpMailer {
        /// # Security
        /// リセットURL（トークンを含む）はログに出力しない
        async fn send_password_reset_email(
            &self,
            to: &str,
            reset_url: &str,
        ) -> Result<(), AppError> {
            let to = to
                .parse::<Mailbox>()
                .map_err(|e| AppError::Validation(format!("宛先が不正です: {e}")))?;

            let message = Message::builder()
                .from(self.from.clone())
                .to(to.clone())
                .subject("パスワードリセット")
                .body(format!(
                    "以下のURLからパスワードを再設定してください:\n{reset_url}\n\n\
                     心当たりがない場合はこのメールを無視してください。"
                ))
                .map_err(|e| AppError::Internal(anyhow::anyhow!("メール構築エラー: {}", e)))?;

            self.transport.send(message).await?;

            tracing::info!(to = %to, "パスワードリセットメール送信完了");

            Ok(())
        }
    }
}

#[cfg(feature = "email")]
pub use smtp::SmtpMailer;
