use std::sync::Mutex;

use tempfile::NamedTempFile;

use fallwatch::config::FallwatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FALLWATCH_CONFIG",
        "FALLWATCH_API_URL",
        "FALLWATCH_API_TIMEOUT_SECS",
        "FALLWATCH_HISTORY_CAP",
        "FALLWATCH_HISTORY_RECENT",
        "FALLWATCH_ALERT_PLAYER",
        "FALLWATCH_TRAINING_URL",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FallwatchConfig::load().expect("load config");

    assert_eq!(cfg.api_base_url, "http://localhost:5000/api");
    assert_eq!(cfg.api_timeout.as_secs(), 30);
    assert_eq!(cfg.history_cap, 100);
    assert_eq!(cfg.recent_window, 20);
    assert!(cfg.alert.enabled);
    assert!(cfg.alert.player.is_none());
    assert!(cfg.training_upload_url.is_none());
    assert_eq!(cfg.imaging.compress.max_width, 1920);
    assert_eq!(cfg.imaging.compress.max_height, 1080);
    assert_eq!(cfg.imaging.compress.quality, 80);
    assert_eq!(cfg.imaging.max_upload_bytes, 10 * 1024 * 1024);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        [api]
        base_url = "http://10.0.0.7:5000/api"
        timeout_secs = 10

        [history]
        cap = 50
        recent = 5

        [alert]
        enabled = false
        player = "paplay"

        [training]
        upload_url = "http://10.0.0.7:5000/api/save_fall_image"

        [imaging]
        max_width = 1280
        max_height = 720
        jpeg_quality = 75
        max_upload_bytes = 2097152
        "#,
    );

    std::env::set_var("FALLWATCH_CONFIG", file.path());
    std::env::set_var("FALLWATCH_HISTORY_CAP", "60");
    std::env::set_var("FALLWATCH_HISTORY_RECENT", "8");
    std::env::set_var("FALLWATCH_ALERT_PLAYER", "aplay -q");
    std::env::set_var("FALLWATCH_API_URL", "   ");

    let cfg = FallwatchConfig::load().expect("load config");

    assert_eq!(cfg.api_base_url, "http://10.0.0.7:5000/api");
    assert_eq!(cfg.api_timeout.as_secs(), 10);
    assert_eq!(cfg.history_cap, 60);
    assert_eq!(cfg.recent_window, 8);
    assert!(!cfg.alert.enabled);
    assert_eq!(cfg.alert.player.as_deref(), Some("aplay -q"));
    assert_eq!(
        cfg.training_upload_url.as_deref(),
        Some("http://10.0.0.7:5000/api/save_fall_image")
    );
    assert_eq!(cfg.imaging.compress.max_width, 1280);
    assert_eq!(cfg.imaging.compress.max_height, 720);
    assert_eq!(cfg.imaging.compress.quality, 75);
    assert_eq!(cfg.imaging.max_upload_bytes, 2 * 1024 * 1024);

    let client_cfg = cfg.client_config();
    assert_eq!(client_cfg.base_url, cfg.api_base_url);
    assert_eq!(client_cfg.timeout.as_secs(), 10);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FALLWATCH_HISTORY_CAP", "lots");
    let err = FallwatchConfig::load().unwrap_err();
    assert!(err.to_string().contains("FALLWATCH_HISTORY_CAP"));
    clear_env();

    std::env::set_var("FALLWATCH_HISTORY_CAP", "0");
    assert!(FallwatchConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLWATCH_HISTORY_RECENT", "0");
    let err = FallwatchConfig::load().unwrap_err();
    assert!(err.to_string().contains("recent history window"));
    clear_env();

    std::env::set_var("FALLWATCH_API_URL", "ftp://backend/api");
    let err = FallwatchConfig::load().unwrap_err();
    assert!(err.to_string().contains("http or https"));
    clear_env();

    let file = write_config("[imaging]\njpeg_quality = 0\n");
    std::env::set_var("FALLWATCH_CONFIG", file.path());
    assert!(FallwatchConfig::load().is_err());
    clear_env();

    let file = write_config("[surprise]\nkey = 1\n");
    std::env::set_var("FALLWATCH_CONFIG", file.path());
    let err = FallwatchConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));
    clear_env();
}
