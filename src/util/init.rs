use log::LevelFilter;

/// Initializes `env_logger`.
///
/// `RUST_LOG` takes precedence over `level`, which defaults to `Info`. Calling this more than once
/// is fine.
pub fn set_logger(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level.unwrap_or(LevelFilter::Info));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.try_init().ok();
}
