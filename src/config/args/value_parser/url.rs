use url::Url;

const INVALID_SCHEME: &str = "scheme must be https:// or http:// .";

pub fn check_scheme(url: &str) -> Result<String, String> {
    let parsed = Url::parse(url).map_err(|e| e.to_string())?;

    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(INVALID_SCHEME.to_string());
    }

    Ok(url.to_string())
}

/// Accepts `host[:port]` as well as a full http(s) URL.
pub fn check_host_or_url(value: &str) -> Result<String, String> {
    if value.contains("://") {
        return check_scheme(value);
    }

    Url::parse(&format!("http://{value}")).map_err(|e| e.to_string())?;

    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_url() {
        init_dummy_tracing_subscriber();

        check_scheme("https://endpoint_url.local").unwrap();
        check_scheme("https://endpoint_url.local/").unwrap();
        check_scheme("http://localhost:9000").unwrap();
        check_scheme("http://127.0.0.1:10000/devstoreaccount1").unwrap();
    }

    #[test]
    fn invalid_url() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            check_scheme("ftp://endpoint_url.local").unwrap_err(),
            INVALID_SCHEME
        );
        assert!(check_scheme("endpoint_url.local").is_err());
    }

    #[test]
    fn host_or_url() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            check_host_or_url("oss-cn-hangzhou.aliyuncs.com").unwrap(),
            "oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(check_host_or_url("localhost:4443").unwrap(), "localhost:4443");
        check_host_or_url("https://oss-cn-hangzhou.aliyuncs.com").unwrap();

        assert!(check_host_or_url("ftp://localhost:4443").is_err());
        assert!(check_host_or_url("local host").is_err());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
