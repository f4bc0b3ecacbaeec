use prefix_proxy::config::*;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert_eq!(config.server.bind_address, "127.0.0.1");
    assert_eq!(config.server.port, 443);
    assert_eq!(config.tls.cert_file, "./server.crt");
    assert_eq!(config.tls.key_file, "./server.key");
    assert_eq!(config.routes.len(), 2);
    assert_eq!(config.routes[0].path_prefix, "");
    assert_eq!(config.routes[0].port, 444);
    assert_eq!(config.routes[1].path_prefix, "/api");
    assert_eq!(config.routes[1].port, 446);
    assert!(config.upstream.insecure_skip_verify);
    assert_eq!(config.routing.match_mode, MatchMode::Prefix);
    assert!(!config.healthcheck.enabled);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[server]
bind_address = "0.0.0.0"
port = 8443

[tls]
cert_file = "/etc/proxy/cert.pem"
key_file = "/etc/proxy/key.pem"

[upstream]
insecure_skip_verify = false
response_timeout_secs = 5

[routing]
match_mode = "segment"

[[routes]]
host = "10.0.0.1"
port = 8000

[[routes]]
host = "10.0.0.2"
port = 9000
path_prefix = "/api"
insecure_skip_verify = true
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml_content.as_bytes()).unwrap();
    file.flush().unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.bind_addr(), "0.0.0.0:8443");
    assert_eq!(config.tls.cert_file, "/etc/proxy/cert.pem");
    assert!(!config.upstream.insecure_skip_verify);
    assert_eq!(config.upstream.response_timeout_secs, 5);
    assert_eq!(config.upstream.connect_timeout_secs, 10);
    assert_eq!(config.routing.match_mode, MatchMode::Segment);
    assert_eq!(config.routes.len(), 2);
    assert_eq!(config.routes[0].path_prefix, "");
    assert!(!config.routes[0].skip_verify(&config.upstream));
    assert!(config.routes[1].skip_verify(&config.upstream));
    assert_eq!(config.routes[1].authority(), "10.0.0.2:9000");
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_routes_section_uses_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[server]\nport = 9443\n").unwrap();
    file.flush().unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.server.port, 9443);
    assert_eq!(config.server.bind_address, "127.0.0.1");
    assert_eq!(config.routes.len(), 2);
}

#[test]
fn test_invalid_toml_is_error() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[server\nport = ").unwrap();
    file.flush().unwrap();

    assert!(AppConfig::from_file(file.path()).is_err());
}

#[test]
fn test_load_or_default_missing_file() {
    let config = AppConfig::load_or_default("/nonexistent/file.toml").unwrap();
    assert_eq!(config.routes.len(), 2);
    assert_eq!(config.server.port, 443);
}

#[test]
fn test_load_or_default_rejects_unparsable_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[[routes]]\nhost = \"10.0.0.1\"\nport = \"eighty\"\n")
        .unwrap();
    file.flush().unwrap();

    let err = AppConfig::load_or_default(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_load_or_default_reads_existing_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[[routes]]\nhost = \"10.0.0.1\"\nport = 8000\n")
        .unwrap();
    file.flush().unwrap();

    let config = AppConfig::load_or_default(file.path()).unwrap();
    assert_eq!(config.routes, vec![RouteConfig::new("10.0.0.1", 8000, "")]);
}

#[test]
fn test_env_overrides() {
    let mut config = AppConfig::default();
    config
        .apply_overrides_from(lookup(&[("HOST", "0.0.0.0"), ("PORT", "8443")]))
        .unwrap();
    assert_eq!(config.bind_addr(), "0.0.0.0:8443");
}

#[test]
fn test_env_overrides_absent_or_empty() {
    let mut config = AppConfig::default();
    config
        .apply_overrides_from(lookup(&[("HOST", "")]))
        .unwrap();
    assert_eq!(config.bind_addr(), "127.0.0.1:443");
}

#[test]
fn test_env_override_invalid_port() {
    let mut config = AppConfig::default();
    let result = config.apply_overrides_from(lookup(&[("PORT", "https")]));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Invalid PORT"));
    assert_eq!(config.server.port, 443);
}

#[test]
fn test_validate_rejects_two_catch_all_routes() {
    let mut config = AppConfig::default();
    config.routes = vec![
        RouteConfig::new("127.0.0.1", 444, ""),
        RouteConfig::new("127.0.0.1", 445, "/a"),
        RouteConfig::new("127.0.0.1", 446, ""),
    ];
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("catch-all"));
}

#[test]
fn test_validate_rejects_bad_routes() {
    let mut config = AppConfig::default();
    config.routes = vec![];
    assert!(config.validate().is_err());

    config.routes = vec![RouteConfig::new("127.0.0.1", 444, "api")];
    assert!(config.validate().is_err());

    config.routes = vec![RouteConfig::new("", 444, "/api")];
    assert!(config.validate().is_err());

    config.routes = vec![RouteConfig::new("127.0.0.1", 0, "/api")];
    assert!(config.validate().is_err());

    config.routes = vec![
        RouteConfig::new("127.0.0.1", 444, "/api"),
        RouteConfig::new("127.0.0.1", 445, "/api"),
    ];
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_healthcheck_port_conflict() {
    let mut config = AppConfig::default();
    config.healthcheck.enabled = true;
    config.healthcheck.port = config.server.port;
    assert!(config.validate().is_err());

    config.healthcheck.port = 8080;
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_zero_handshake_timeout() {
    let mut config = AppConfig::default();
    assert_eq!(config.server.handshake_timeout_secs, 10);
    config.server.handshake_timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_requires_tls_files() {
    let mut config = AppConfig::default();
    config.tls.key_file = String::new();
    assert!(config.validate().is_err());
}
