pub mod email;
pub mod stats;

pub use email::{MailResult, Mailer, OutgoingEmail, SmtpMailer};
pub use stats::StatsRegistry;
