#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;
pub fn main() {
    // `log` records go to the log4rs file configured at startup, so no log bridge is installed here
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error installing tracing subscriber: {e}");
    }
    stx_cli::run_cli();
}
