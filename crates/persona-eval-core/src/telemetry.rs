//! Log output for the `persona-eval` binary and ad-hoc embedding hosts.
//!
//! Everything goes to stderr: stdout carries the JSON harness report and
//! must stay machine-readable. `RUST_LOG` overrides the default filter,
//! which keeps the storage and HTTP stacks at `warn` so judge and
//! evaluation events are not drowned out.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose `info`/`debug` chatter is noise during an evaluation run.
const QUIET_CRATES: [&str; 4] = ["surrealdb", "reqwest", "hyper", "rustls"];

/// Default filter for `level` when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    directives.extend(QUIET_CRATES.iter().map(|c| format!("{c}=warn")));
    directives.join(",")
}

/// Install the global subscriber: plain text, or one JSON object per line
/// when `json` is set (CI log shipping). A second call is a no-op.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let text = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let structured = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(structured)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiets_dependency_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "debug,surrealdb=warn,reqwest=warn,hyper=warn,rustls=warn"
        );
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
