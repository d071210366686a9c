pub mod email;
pub mod password;
pub mod password_reset;
pub mod reset_token;

#[cfg(feature = "email")]
pub use email::SmtpMailer;
pub use email::{LogMailer, Mailer};
pub use password_reset::PasswordResetService;
pub use reset_token::ResetTokenService;
