//! Telegram channel tests against a mock Bot API server

use serde_json::json;
use teloxide::prelude::*;
use wiremock::{
    matchers::{path, path_regex},
    Mock, MockServer, ResponseTemplate,
};
use DietBuddy::services::TelegramChannel;

const TOKEN: &str = "12345:test_token";

fn channel_for(server: &MockServer) -> TelegramChannel {
    let bot = Bot::new(TOKEN).set_api_url(server.uri().parse().unwrap());
    TelegramChannel::new(bot)
}

#[tokio::test]
async fn test_download_voice_file() {
    let server = MockServer::start().await;
    Mock::given(path_regex(r"(?i)^/bot[^/]+/getfile$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "file_id": "voice-1",
                "file_unique_id": "unique-1",
                "file_size": 4,
                "file_path": "voice/file_1.oga"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path(format!("/file/bot{}/voice/file_1.oga", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x4f, 0x67, 0x67, 0x53]))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server);
    let audio = channel.download("voice-1").await.unwrap();
    assert_eq!(audio, vec![0x4f, 0x67, 0x67, 0x53]);
}

#[tokio::test]
async fn test_download_of_unknown_file_fails() {
    let server = MockServer::start().await;
    Mock::given(path_regex(r"(?i)^/bot[^/]+/getfile$"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: invalid file_id"
        })))
        .mount(&server)
        .await;

    let channel = channel_for(&server);
    assert!(channel.download("missing").await.is_err());
}
