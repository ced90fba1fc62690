// Notifier plugin implementations
pub mod log;
pub mod email;
pub mod discord;

pub use log::LogNotifier;
pub use email::EmailNotifier;
pub use discord::DiscordNotifier;
