use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Shared cleartext password for every user and semester.
#[derive(Debug)]
pub struct TimetableAuthSource {
    password: String,
}

impl TimetableAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for TimetableAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        tracing::debug!(?login, "password login");
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
