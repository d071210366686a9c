use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::error::AppError;
use crate::services::email::Mailer;
use crate::services::password::hash_password;
use crate::services::reset_token::ResetTokenService;
use crate::stores::UserStore;

/// パスワードリセットフロー
///
/// トークンの発行・検証（`ResetTokenService`）を、ユーザーストアと
/// Mailerにつなぐオーケストレーション層。
#[derive(Clone)]
pub struct PasswordResetService<S, M> {
    user_store: S,
    mailer: M,
    tokens: ResetTokenService,
    config: Arc<Config>,
}

impl<S: UserStore, M: Mailer> PasswordResetService<S, M> {
    /// 新しい PasswordResetService を作成
    ///
    /// シークレットが短すぎる等の設定不備はここでエラーになる
    /// （リクエスト処理中ではなく起動時に失敗させる）。
    pub fn new(user_store: S, mailer: M, config: Arc<Config>) -> Result<Self, AppError> {
        let tokens = ResetTokenService::new(
            config.reset_token_secret.expose_secret(),
            config.reset_token_ttl_secs,
        )?;

        Ok(Self {
            user_store,
            mailer,
            tokens,
            config,
        })
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も常に成功を返す（情報漏洩防止）
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let user = self.user_store.find_by_email(email).await?;

        // ユーザーが存在しない場合も成功を返す（情報漏洩防止）
        let user = match user {
            Some(u) => u,
            None => {
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
                return Ok(());
            }
        };

        let token = self.tokens.issue(user.id)?;
        let reset_url = self.build_reset_url(&token);

        self.mailer
            .send_password_reset_email(email, &reset_url)
            .await?;

        tracing::info!(email = %email, "パスワードリセットメール送信完了");

        Ok(())
    }

    /// パスワードをリセット
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    /// - 検証失敗の理由（形式不正・署名不一致・期限切れ・ユーザー不在）は
    ///   呼び出し側に区別させない
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let user_id = self.tokens.verify(token)?;

        // トークンが有効でも対象ユーザーが既に消えている場合がある
        let user = self
            .user_store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::TokenInvalid)?;

        let password_hash = hash_password(new_password)?;

        self.user_store
            .update_password(user.id, &password_hash)
            .await?;

        tracing::info!(user_id = %user.id, "パスワードリセット完了");

        Ok(())
    }

    /// リセットURLを構築
    fn build_reset_url(&self, token: &str) -> String {
        match &self.config.reset_url_base {
            Some(base) => format!("{}?token={}", base, token),
            None => format!("http://localhost:3000/password-reset?token={}", token),
        }
    }
}
