use anyhow::{Context, Result};
use ember_config::Config;
use ember_statsd::{MetricsClient, MetricsClientConfig};

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        ember_log::info!("launching ember without config folder");
    } else {
        ember_log::info!(
            "launching ember from config folder {}",
            config.path().display()
        );
    }

    match config.upstream() {
        Some(upstream) => ember_log::info!("  upstream: {upstream}"),
        None => ember_log::info!("  upstream: -"),
    };
    ember_log::info!("  log level: {}", config.logging().level);
}

/// Initialize the metric system.
///
/// Returns a disabled client if no statsd server is configured.
pub fn init_metrics(config: &Config) -> Result<MetricsClient> {
    let addrs = config.statsd_addrs()?;
    if addrs.is_empty() {
        return Ok(MetricsClient::disabled());
    }

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    let client = MetricsClient::new(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host: addrs.as_slice(),
        default_tags,
        default_sample_rate: config.metrics_sample_rate().into(),
    })
    .context("failed to set up the statsd client")?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_disabled_without_statsd() {
        let client = init_metrics(&Config::default()).unwrap();
        assert!(client.default_tags.is_empty());
        assert!(client.captures().is_empty());
    }

    #[test]
    fn test_metrics_hostname_tag() {
        let config = Config::from_json_value(serde_json::json!({
            "metrics": {
                "statsd": "127.0.0.1:8125",
                "hostname_tag": "host",
                "default_tags": {"region": "eu"}
            }
        }))
        .unwrap();

        let client = init_metrics(&config).unwrap();
        assert_eq!(client.default_tags["region"], "eu");
        assert!(client.default_tags.contains_key("host"));
    }
}
