use super::*;
use crate::config::GeminiConfig;

fn test_provider_config() -> GeminiConfig {
    GeminiConfig {
        api_key: "test-key".to_string(),
        ..GeminiConfig::default()
    }
}

#[test]
fn client_configuration() {
    let client = GeminiClient::new(&test_provider_config()).expect("should create client");

    assert_eq!(client.model, "text-embedding-004");
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(
        client.embed_url.as_str(),
        "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent"
    );
}

#[test]
fn client_requires_api_key() {
    // The env override would mask the missing file key
    unsafe { std::env::remove_var("GEMINI_API_KEY") };

    let config = GeminiConfig {
        api_key: "   ".to_string(),
        ..GeminiConfig::default()
    };

    assert!(matches!(
        GeminiClient::new(&config),
        Err(RagError::Config(_))
    ));
}

#[test]
fn client_builder_methods() {
    let client = GeminiClient::new(&test_provider_config())
        .expect("should create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn request_serialization_matches_wire_format() {
    let request = EmbedRequest {
        model: "models/text-embedding-004".to_string(),
        content: EmbedContent {
            parts: vec![EmbedPart { text: "hello" }],
        },
        task_type: TaskType::Document.as_str(),
    };

    let json = serde_json::to_value(&request).expect("should serialize");

    assert_eq!(json["model"], "models/text-embedding-004");
    assert_eq!(json["content"]["parts"][0]["text"], "hello");
    assert_eq!(json["taskType"], "RETRIEVAL_DOCUMENT");
}

#[test]
fn response_parsing() {
    let body = r#"{"embedding":{"values":[0.1,-0.2,0.3]}}"#;

    let parsed: EmbedResponse = serde_json::from_str(body).expect("should parse");

    assert_eq!(parsed.embedding.values, vec![0.1, -0.2, 0.3]);
}

#[test]
fn task_type_strings() {
    assert_eq!(TaskType::Query.as_str(), "RETRIEVAL_QUERY");
    assert_eq!(TaskType::Document.as_str(), "RETRIEVAL_DOCUMENT");
}
