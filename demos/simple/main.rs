use std::time::Duration;

use dengage::{ClientConfig, InAppMessage, InAppSettings};

pub fn main() {
    env_logger::init();

    let integration_key = std::env::var("DENGAGE_INTEGRATION_KEY").unwrap();
    let account_name = std::env::var("DENGAGE_ACCOUNT").unwrap();

    let client = ClientConfig::from_integration_key(integration_key)
        .device_id("demo-device")
        .in_app_settings(InAppSettings::for_account(account_name))
        .cache_path(std::env::temp_dir().join("dengage-demo/inapp.json"))
        .renderer(|message: &InAppMessage| {
            println!("Showing {}: {:?}", message.message_id, message.content.html());
        })
        .to_client()
        .unwrap();

    // Fetch messages if the fetch interval has elapsed since the last run.
    client.on_foreground().unwrap();
    client.session_start("https://example.com/?utm_source=demo").unwrap();

    // Fetching happens in the background; give it a moment before navigating.
    std::thread::sleep(Duration::from_secs(2));
    client.on_navigate(Some("home")).unwrap();

    std::thread::sleep(Duration::from_secs(1));
    client.message_closed().unwrap();
    client.shutdown().unwrap();
}
