use cloney::Config;

/// The live progress line is only drawn when it would not interleave with log lines.
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    match config.tracing_config.as_ref() {
        None => true,
        Some(tracing_config) => {
            tracing_config.tracing_level <= log::Level::Warn && !tracing_config.json_tracing
        }
    }
}

pub fn is_show_result_needed(config: &Config) -> bool {
    match config.tracing_config.as_ref() {
        None => true,
        Some(tracing_config) => !tracing_config.json_tracing,
    }
}
