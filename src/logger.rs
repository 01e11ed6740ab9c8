use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the timed env logger once per process, `RUST_LOG` picks the level.
pub fn setup_logger() {
    INIT.call_once(|| {
        let _ = pretty_env_logger::formatted_timed_builder()
            .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
            .is_test(true)
            .try_init();
    });
}
