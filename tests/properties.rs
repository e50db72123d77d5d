//! Cross-module behavior checked through the public API.

use std::path::PathBuf;

use tempfile::TempDir;

use tech_web_server::config::parse_config;
use tech_web_server::fastcgi::{Record, RecordType};
use tech_web_server::files::{self, ResolveError};
use tech_web_server::rewrite::{RewriteEngine, RewriteRule, RuleFlags};
use tech_web_server::vhost::VirtualHostRegistry;

#[test]
fn registry_exact_match_then_first_configured() {
    let config = parse_config(
        r#"
        [listener]
        multi_port = true

        [[virtual_hosts]]
        domain = "alpha.test"
        port = 8001
        document_root = "/srv/alpha"

        [[virtual_hosts]]
        domain = "beta.test"
        port = 8002
        document_root = "/srv/beta"

        [[virtual_hosts]]
        domain = "alpha.test"
        port = 8003
        document_root = "/srv/alpha-admin"
        "#,
    )
    .unwrap();
    let registry = VirtualHostRegistry::from_config(&config);

    for (domain, port, root) in [
        ("alpha.test", 8001, "/srv/alpha"),
        ("beta.test", 8002, "/srv/beta"),
        ("alpha.test", 8003, "/srv/alpha-admin"),
    ] {
        let vhost = registry.resolve(Some(domain), Some(port)).unwrap();
        assert_eq!(vhost.document_root, PathBuf::from(root), "{domain}:{port}");
    }

    let fallback = registry.resolve(Some("unknown.test"), Some(8002)).unwrap();
    assert_eq!(fallback.domain, "alpha.test");
    assert_eq!(fallback.port, Some(8001));
}

#[tokio::test]
async fn traversal_never_escapes_the_root() {
    let outer = TempDir::new().unwrap();
    let root = outer.path().join("site");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("index.html"), "ok").unwrap();
    std::fs::write(outer.path().join("secret.txt"), "secret").unwrap();

    for path in ["/../secret.txt", "../secret.txt", "/a/../../secret.txt", "/./../site/index.html"] {
        let result = files::resolve(&root, path).await;
        assert!(matches!(result, Err(ResolveError::Forbidden(_))), "{path}: {result:?}");
    }

    let decoded = files::decode_request_path("/%2e%2e/secret.txt").unwrap();
    assert!(matches!(files::resolve(&root, &decoded).await, Err(ResolveError::Forbidden(_))));
}

#[test]
fn record_round_trip() {
    for len in [0usize, 7, 8, 9, 4096] {
        let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let record = Record::new(RecordType::Stdout, 1, content.clone());
        let bytes = record.encode().unwrap();
        assert_eq!(bytes.len() % 8, 0, "records are padded to 8 bytes");

        let (decoded, consumed) = Record::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.record_type, RecordType::Stdout);
        assert_eq!(decoded.request_id, 1);
        assert_eq!(decoded.content, content);
    }
}

#[tokio::test]
async fn rewrite_qsa_appends_original_query() {
    let (flags, _) = RuleFlags::parse(["QSA"]);
    let rule = RewriteRule::new("^(.*)$", "/index.php", "r=$1", Vec::new(), flags).unwrap();
    let engine = RewriteEngine::new("/nonexistent", vec![rule]);
    assert_eq!(
        engine.process("/a/b", "x=1").await,
        ("/index.php".to_string(), "r=/a/b&x=1".to_string())
    );
}

#[tokio::test]
async fn rewrite_last_flag_stops_processing() {
    let (last, _) = RuleFlags::parse(["L"]);
    let none = RuleFlags::default();
    let api = RewriteRule::new("^/api/(.*)$", "/api.php", "endpoint=$1", Vec::new(), last).unwrap();
    let everything = RewriteRule::new("^(.*)$", "/index.php", "", Vec::new(), none).unwrap();
    let engine = RewriteEngine::new("/nonexistent", vec![api, everything]);

    assert_eq!(
        engine.process("/api/users", "").await,
        ("/api.php".to_string(), "endpoint=users".to_string())
    );
}

#[tokio::test]
async fn directory_index_prefers_html() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir(root.path().join("docs")).unwrap();
    std::fs::write(root.path().join("docs/index.php"), "<?php").unwrap();
    std::fs::write(root.path().join("docs/index.html"), "html").unwrap();

    let resolved = files::resolve(root.path(), "/docs/").await.unwrap();
    assert_eq!(resolved.index_file, Some("index.html"));
    assert!(resolved.file_path.ends_with("docs/index.html"));
    assert!(resolved.is_directory_indexed());
}
