use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::User;

/// ユーザーストアの抽象
///
/// ユーザーの永続化はこのcrateの関心外のため、呼び出し側が
/// 実装（RDBMSなど）を注入する。
#[async_trait]
pub trait UserStore: Send + Sync {
    /// メールアドレスでユーザーを検索
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// ユーザーIDでユーザーを検索
    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, AppError>;

    /// ユーザーのパスワードハッシュを更新
    ///
    /// # Note
    /// password_hash はログに出力しないこと
    async fn update_password(
        &self,
        user_id: i64,
        new_password_hash: &str,
    ) -> Result<(), AppError>;
}

/// インメモリのユーザーストア（テスト・組み込み用）
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<HashMap<i64, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーを登録（既存IDは上書き）
    pub fn insert(&self, user: User) {
        self.users
            .lock()
            .expect("user store lock poisoned")
            .insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().expect("user store lock poisoned");
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let users = self.users.lock().expect("user store lock poisoned");
        Ok(users.get(&user_id).cloned())
    }

    async fn update_password(
        &self,
        user_id: i64,
        new_password_hash: &str,
    ) -> Result<(), AppError> {
        let mut users = self.users.lock().expect("user store lock poisoned");
        let user = users.get_mut(&user_id).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("user not found: {}", user_id))
        })?;
        user.password_hash = new_password_hash.to_string();
        Ok(())
    }
}
