use upbproxy::config::{Config, DisplayFormat};

#[tokio::test]
async fn default_config_written_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let path = path.to_str().unwrap();

    Config::create_default(path).await.unwrap();
    let config = Config::load(path).await.unwrap();
    assert_eq!(config.proxy.pim_port, 2101);
    assert_eq!(config.proxy.listen_port, 2101);
    assert_eq!(config.auth.username, "upstart");
    assert!(config.auth.password.is_none());
    assert_eq!(config.display.format, DisplayFormat::Text);
}

#[tokio::test]
async fn saved_password_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let path = path.to_str().unwrap();

    let mut config = Config::default();
    config.proxy.pim_host = "pim.local".to_string();
    config.auth.password = Some("s3cret".to_string());
    config.save(path).await.unwrap();

    let loaded = Config::load(path).await.unwrap();
    assert_eq!(loaded.proxy.pim_addr(), "pim.local:2101");
    let creds = loaded.credentials().unwrap();
    assert_eq!(creds.password, "s3cret");
}

#[tokio::test]
async fn invalid_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("nope.toml");
    let err = Config::load(missing.to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));

    let bad = dir.path().join("bad.toml");
    tokio::fs::write(&bad, "[proxy]\npim_host = \"\"\n").await.unwrap();
    assert!(Config::load(bad.to_str().unwrap()).await.is_err());

    let garbage = dir.path().join("garbage.toml");
    tokio::fs::write(&garbage, "proxy = 12").await.unwrap();
    let err = Config::load(garbage.to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}
