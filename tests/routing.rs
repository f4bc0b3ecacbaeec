use prefix_proxy::config::{AppConfig, MatchMode, RouteConfig};
use prefix_proxy::error::RouteError;
use prefix_proxy::route::{Route, RouteMatcher};
use prefix_proxy::routing::table::{prefix_matches, strip_prefix};
use prefix_proxy::routing::{RouteTable, create_route_table};

fn default_table() -> RouteTable {
    RouteTable::new(
        vec![
            Route::new("a.internal", 444, ""),
            Route::new("b.internal", 446, "/api"),
        ],
        MatchMode::Prefix,
    )
}

#[test]
fn test_api_route_strips_prefix() {
    let table = default_table();
    let m = table.match_path("/api/users").unwrap();
    assert_eq!(m.route.host, "b.internal");
    assert_eq!(m.route.port, 446);
    assert_eq!(m.upstream_path, "/users");
}

#[test]
fn test_catch_all_keeps_path() {
    let table = default_table();
    let m = table.match_path("/home").unwrap();
    assert_eq!(m.route.host, "a.internal");
    assert_eq!(m.upstream_path, "/home");
}

#[test]
fn test_query_string_is_kept() {
    let table = default_table();
    let m = table.match_path("/api/search?q=rust&page=2").unwrap();
    assert_eq!(m.upstream_path, "/search?q=rust&page=2");

    let m = table.match_path("/api?q=1").unwrap();
    assert_eq!(m.upstream_path, "/?q=1");
}

#[test]
fn test_exact_prefix_becomes_root() {
    let table = default_table();
    let m = table.match_path("/api").unwrap();
    assert_eq!(m.route.port, 446);
    assert_eq!(m.upstream_path, "/");
}

#[test]
fn test_later_declared_route_wins_every_time() {
    let table = RouteTable::new(
        vec![
            Route::new("general", 1000, "/api"),
            Route::new("specific", 1001, "/api/v2"),
        ],
        MatchMode::Prefix,
    );
    for _ in 0..100 {
        let m = table.match_path("/api/v2/items").unwrap();
        assert_eq!(m.route.host, "specific");
        assert_eq!(m.upstream_path, "/items");
    }
    let m = table.match_path("/api/v1/items").unwrap();
    assert_eq!(m.route.host, "general");
    assert_eq!(m.upstream_path, "/v1/items");
}

#[test]
fn test_no_catch_all_yields_no_route() {
    let table = RouteTable::new(
        vec![Route::new("b.internal", 446, "/api")],
        MatchMode::Prefix,
    );
    assert!(table.match_path("/home").is_none());
    assert_eq!(
        table.resolve("/home").unwrap_err(),
        RouteError::NoRouteMatched {
            path: "/home".to_string()
        }
    );
}

#[test]
fn test_prefix_mode_is_byte_wise() {
    let table = default_table();
    let m = table.match_path("/apiextra").unwrap();
    assert_eq!(m.route.port, 446);
    assert_eq!(m.upstream_path, "/extra");
}

#[test]
fn test_segment_mode_respects_boundaries() {
    let table = RouteTable::new(
        vec![
            Route::new("a.internal", 444, ""),
            Route::new("b.internal", 446, "/api"),
        ],
        MatchMode::Segment,
    );
    assert_eq!(table.match_path("/apiextra").unwrap().route.port, 444);
    assert_eq!(table.match_path("/api").unwrap().route.port, 446);
    assert_eq!(table.match_path("/api/").unwrap().route.port, 446);
    assert_eq!(table.match_path("/api?x=1").unwrap().route.port, 446);
}

#[test]
fn test_prefix_matches_helper() {
    assert!(prefix_matches("", "/anything", MatchMode::Segment));
    assert!(prefix_matches("/static/", "/static/app.js", MatchMode::Segment));
    assert!(!prefix_matches("/api", "/ap", MatchMode::Prefix));
    assert!(prefix_matches("/api", "/apix", MatchMode::Prefix));
    assert!(!prefix_matches("/api", "/apix", MatchMode::Segment));
}

#[test]
fn test_strip_prefix_helper() {
    assert_eq!(strip_prefix("/api/users", "/api"), "/users");
    assert_eq!(strip_prefix("/", ""), "/");
}

#[test]
fn test_route_table_from_config() {
    let mut config = AppConfig::default();
    config.upstream.insecure_skip_verify = false;
    config.routes = vec![
        RouteConfig::new("127.0.0.1", 444, ""),
        RouteConfig {
            insecure_skip_verify: Some(true),
            ..RouteConfig::new("127.0.0.1", 446, "/api")
        },
    ];

    let table = create_route_table(&config);
    assert_eq!(table.len(), 2);
    assert!(!table.routes()[0].skip_verify);
    assert!(table.routes()[1].skip_verify);
    assert_eq!(table.routes()[1].authority(), "127.0.0.1:446");
    assert!(table.routes()[0].is_catch_all());
}
