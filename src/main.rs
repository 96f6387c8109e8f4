use upkit::commands::Cli;
use upkit::libs::error::UpdateError;
use upkit::libs::messages::{macros::is_debug_mode, Message};
use upkit::msg_error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if is_debug_mode() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("upkit=debug")))
            .init();
    }

    if let Err(e) = Cli::menu().await {
        match e.downcast_ref::<UpdateError>() {
            Some(update_error) => {
                msg_error!(Message::StageFailed {
                    stage: update_error.stage().to_string(),
                    detail: update_error.detail(),
                });
                if update_error.is_retryable() {
                    msg_error!(Message::RetryHint);
                }
            }
            None => msg_error!(format!("{:#}", e)),
        }
        std::process::exit(1);
    }
}
