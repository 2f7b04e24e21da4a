use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::TracingFormat;
use crate::config::Config;

/// Configure and install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to this
/// crate's targets with noisy infrastructure (cookie jar, HTTP internals)
/// capped at warn.
pub fn setup_logging(config: &Config, format: TracingFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let base_level = &config.log_level;
        EnvFilter::new(format!(
            "warn,teewatch={base_level},teewatch::session=debug,hyper=warn,reqwest=warn"
        ))
    });

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match format {
        TracingFormat::Pretty => Box::new(
            FmtSubscriber::builder()
                .with_target(true)
                .with_env_filter(filter)
                .finish(),
        ),
        TracingFormat::Json => Box::new(
            FmtSubscriber::builder()
                .with_target(true)
                .json()
                .with_env_filter(filter)
                .finish(),
        ),
    };

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}
