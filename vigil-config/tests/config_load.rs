use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;
use vigil_config::VigilConfigLoader;

/// Helper to write a file in a temp dir and return its path.
fn write_file(tmp: &TempDir, name: &str, contents: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, contents).expect("write file");
    p
}

#[test]
#[serial]
fn test_config_load() {
    let tmp = TempDir::new().unwrap();
    let accounts = write_file(
        &tmp,
        "dev-accounts.json",
        r#"[{"username": "taviso"}, {"username": "  "}, {"username": "halvarflake"}]"#,
    );

    let file_yaml = format!(
        r#"
crawler:
  x:
    accounts: ["ignored_when_file_present"]
    accounts_file: "{}"
    bearer_token: "${{VIGIL_TEST_BEARER}}"
proxy:
  crawler_proxy_enabled: true
  proxy_url: "http://127.0.0.1:7890"
bot:
  onebot:
    api: "http://127.0.0.1:3000"
    group_id: 123456
    timeout_secs: 5
"#,
        accounts.display()
    );
    let p = write_file(&tmp, "vigil.yaml", &file_yaml);

    temp_env::with_vars(
        [
            ("VIGIL_TEST_BEARER", Some("from-env")),
            ("VIGIL__BOT__ONEBOT__USER_ID", Some("987")),
        ],
        || {
            let config = VigilConfigLoader::new()
                .with_file(&p)
                .load()
                .expect("load system config");

            assert_eq!(config.crawler.x.bearer_token.as_deref(), Some("from-env"));
            assert_eq!(
                config.crawler.x.roster(),
                vec!["taviso".to_string(), "halvarflake".to_string()]
            );
            assert_eq!(config.proxy.crawler_proxy(), Some("http://127.0.0.1:7890"));
            assert_eq!(config.bot.onebot.group_id, Some(123456));
            assert_eq!(config.bot.onebot.user_id, Some(987));
            assert_eq!(config.bot.onebot.timeout_secs, 5);
        },
    );
}

#[test]
#[serial]
fn missing_optional_file_is_fine() {
    let tmp = TempDir::new().unwrap();
    let config = VigilConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("defaults only");
    assert!(config.bot.onebot.api.is_empty());
    assert_eq!(config.bot.onebot.group_id, None);
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let err = VigilConfigLoader::new()
        .with_file(tmp.path().join("absent.yaml"))
        .load();
    assert!(err.is_err());
}
