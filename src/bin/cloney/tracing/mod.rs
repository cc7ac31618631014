use std::env;

use rusty_fork::rusty_fork_test;
use tracing_subscriber::fmt::format::FmtSpan;

use cloney::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

/// Provider SDK crates whose events are shown with `--sdk-tracing`.
const SDK_TRACING_TARGETS: [&str; 5] = [
    "aws_smithy_runtime",
    "aws_config",
    "aws_sigv4",
    "gcloud_storage",
    "azure_storage_blobs",
];

fn event_filter(config: &TracingConfig) -> (String, bool) {
    let tracing_level = config.tracing_level;

    if config.aws_sdk_tracing {
        let mut filter = format!("cloney={tracing_level}");
        for target in SDK_TRACING_TARGETS {
            filter.push_str(&format!(",{target}={tracing_level}"));
        }
        return (filter, true);
    }

    if let Ok(filter) = env::var(EVENT_FILTER_ENV_VAR) {
        return (filter, true);
    }

    (format!("cloney={tracing_level}"), false)
}

pub fn init_tracing(config: &TracingConfig) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (event_filter, show_target) = event_filter(config);

    let subscriber_builder = tracing_subscriber::fmt()
        .compact()
        .with_ansi(!config.disable_color_tracing)
        .with_span_events(fmt_span)
        .with_env_filter(event_filter)
        .with_target(show_target);

    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

#[cfg(test)]
fn tracing_config(json_tracing: bool, aws_sdk_tracing: bool) -> TracingConfig {
    TracingConfig {
        tracing_level: log::Level::Info,
        json_tracing,
        aws_sdk_tracing,
        span_events_tracing: false,
        disable_color_tracing: false,
    }
}

rusty_fork_test! {
    #[test]
    fn sdk_tracing_filter() {
        let (filter, show_target) = event_filter(&tracing_config(false, true));

        assert!(filter.starts_with("cloney=INFO"));
        assert!(filter.contains("aws_smithy_runtime=INFO"));
        assert!(filter.contains("azure_storage_blobs=INFO"));
        assert!(show_target);
    }

    #[test]
    fn default_filter() {
        // This code is used to test purpose only and run separated processes.
        unsafe { env::remove_var(EVENT_FILTER_ENV_VAR) };

        let (filter, show_target) = event_filter(&tracing_config(false, false));

        assert_eq!(filter, "cloney=INFO");
        assert!(!show_target);
    }

    #[test]
    fn init_json_tracing() {
        init_tracing(&tracing_config(true, false));
    }

    #[test]
    fn init_normal_tracing() {
        // This code is used to test purpose only and run separated processes.
        unsafe { env::remove_var(EVENT_FILTER_ENV_VAR) };

        init_tracing(&tracing_config(false, false));
    }

    #[test]
    fn init_span_events_tracing() {
        init_tracing(&TracingConfig {
            span_events_tracing: true,
            disable_color_tracing: true,
            ..tracing_config(false, true)
        });
    }

    #[test]
    fn init_with_env() {
        // This code is used to test purpose only and run separated processes.
        unsafe { env::set_var(EVENT_FILTER_ENV_VAR, "trace") };

        let (filter, show_target) = event_filter(&tracing_config(false, false));
        assert_eq!(filter, "trace");
        assert!(show_target);

        init_tracing(&tracing_config(false, false));
    }
}
