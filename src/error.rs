#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("シリアライズエラー")]
    Serialization(#[from] serde_json::Error),

    /// トークン検証の失敗は理由を区別しない
    ///
    /// # Security
    /// 形式不正・署名不一致・期限切れのどれであったかを呼び出し側に
    /// 漏らさない（オラクル攻撃対策）。
    #[error("無効または期限切れのリンクです")]
    TokenInvalid,

    #[cfg(feature = "email")]
    #[error("メール送信エラー")]
    Email(#[from] lettre::transport::smtp::Error),
}
