//! Mock API tests for the Gemini and ElevenLabs clients
//!
//! A local wiremock server stands in for both services.

use serde_json::json;
use voiceover::analyze::{AnalysisRequest, GeminiAnalyzer, VideoAnalyzer};
use voiceover::error::{ApiErrorKind, VoiceoverError};
use voiceover::voice::{ElevenLabsClient, SpeechRequest, VoiceSynthesizer};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Gemini API Mock Tests
// ============================================================================

mod gemini_tests {
    use super::*;

    const GENERATE_PATH: &str = "/models/gemini-2.0-flash:generateContent";

    fn request() -> AnalysisRequest<'static> {
        AnalysisRequest {
            video: b"fake mp4 bytes",
            mime_type: "video/mp4",
            goal: "Explain the onboarding flow",
            language_code: "en",
            language_name: "English",
            target_duration: Some(12.0),
        }
    }

    fn candidate(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }], "role": "model" },
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "generation_config": { "response_mime_type": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
                r#"{"transcript": "Sign up in seconds.", "timestamps": [{"time": "00:00", "text": "Sign up in seconds."}]}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let analyzer = GeminiAnalyzer::new("test-key".to_string()).with_base_url(server.uri());
        let narration = analyzer.analyze(&request()).await.unwrap();

        assert_eq!(narration.transcript, "Sign up in seconds.");
        assert_eq!(narration.timestamps.len(), 1);
        assert_eq!(analyzer.name(), "Google Gemini");
    }

    #[tokio::test]
    async fn test_analyze_strips_code_fence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
                "```json\n{\"transcript\": \"Fenced narration\", \"timestamps\": []}\n```",
            )))
            .mount(&server)
            .await;

        let analyzer = GeminiAnalyzer::new("test-key".to_string()).with_base_url(server.uri());
        let narration = analyzer.analyze(&request()).await.unwrap();
        assert_eq!(narration.transcript, "Fenced narration");
    }

    #[tokio::test]
    async fn test_custom_model_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-pro:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidate(r#"{"transcript": "Pro model"}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let analyzer = GeminiAnalyzer::new("test-key".to_string())
            .with_model("gemini-1.5-pro")
            .with_base_url(server.uri());
        assert_eq!(
            analyzer.analyze(&request()).await.unwrap().transcript,
            "Pro model"
        );
    }

    #[tokio::test]
    async fn test_unauthorized_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "code": 401, "message": "API key not valid.", "status": "UNAUTHENTICATED" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let analyzer = GeminiAnalyzer::new("bad-key".to_string()).with_base_url(server.uri());
        match analyzer.analyze(&request()).await {
            Err(VoiceoverError::Api {
                service,
                status,
                kind,
                message,
            }) => {
                assert_eq!(service, "Gemini");
                assert_eq!(status, 401);
                assert_eq!(kind, ApiErrorKind::Unauthorized);
                assert_eq!(message, "API key not valid.");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
            .expect(1)
            .mount(&server)
            .await;

        let analyzer = GeminiAnalyzer::new("test-key".to_string()).with_base_url(server.uri());
        match analyzer.analyze(&request()).await {
            Err(VoiceoverError::Api { kind, .. }) => assert_eq!(kind, ApiErrorKind::RateLimited),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let analyzer = GeminiAnalyzer::new("test-key".to_string()).with_base_url(server.uri());
        assert!(matches!(
            analyzer.analyze(&request()).await,
            Err(VoiceoverError::MalformedResponse(_))
        ));
    }
}

// ============================================================================
// ElevenLabs API Mock Tests
// ============================================================================

mod elevenlabs_tests {
    use super::*;

    #[tokio::test]
    async fn test_synthesize_returns_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-123"))
            .and(query_param("output_format", "mp3_44100_128"))
            .and(header("xi-api-key", "el-key"))
            .and(body_partial_json(json!({
                "text": "Hello world",
                "model_id": "eleven_multilingual_v2"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(b"ID3fake-mp3".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new(" el-key ".to_string()).with_base_url(server.uri());
        let request = SpeechRequest::new("  Hello world\n", "voice-123", "eleven_multilingual_v2");
        let audio = client.synthesize(&request).await.unwrap();

        assert_eq!(audio, b"ID3fake-mp3");
        assert_eq!(client.name(), "ElevenLabs");
        assert_eq!(client.audio_extension(), "mp3");
    }

    #[tokio::test]
    async fn test_blank_voice_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/JBFqnCBsd6RMkjVDRZzb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("el-key".to_string()).with_base_url(server.uri());
        let request = SpeechRequest::new("Hi", "", "");
        assert_eq!(client.synthesize(&request).await.unwrap(), b"mp3");
    }

    #[tokio::test]
    async fn test_validation_error_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-123"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": { "status": "text_too_long", "message": "Text exceeds the character limit" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("el-key".to_string()).with_base_url(server.uri());
        let request = SpeechRequest::new("Hi", "voice-123", "eleven_multilingual_v2");
        match client.synthesize(&request).await {
            Err(VoiceoverError::Api {
                service,
                kind,
                message,
                ..
            }) => {
                assert_eq!(service, "ElevenLabs");
                assert_eq!(kind, ApiErrorKind::InvalidRequest);
                assert_eq!(message, "Text exceeds the character limit");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_uses_category_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-123"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("el-key".to_string()).with_base_url(server.uri());
        let request = SpeechRequest::new("Hi", "voice-123", "eleven_multilingual_v2");
        match client.synthesize(&request).await {
            Err(VoiceoverError::Api { kind, message, .. }) => {
                assert_eq!(kind, ApiErrorKind::Server);
                assert_eq!(message, kind.user_message("ElevenLabs"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_voices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/voices"))
            .and(header("xi-api-key", "el-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "voices": [
                    {
                        "voice_id": "JBFqnCBsd6RMkjVDRZzb",
                        "name": "George",
                        "category": "premade",
                        "labels": { "accent": "british", "gender": "male" },
                        "preview_url": "https://example.com/george.mp3"
                    },
                    { "voice_id": "abc", "name": "Custom" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("el-key".to_string()).with_base_url(server.uri());
        let voices = client.list_voices().await.unwrap();

        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].name, "George");
        assert_eq!(voices[0].describe(), "male, british");
        assert_eq!(voices[1].category, None);
        assert_eq!(voices[1].describe(), "");
    }

    #[tokio::test]
    async fn test_preview_uses_sample_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-9"))
            .and(body_partial_json(json!({
                "text": voiceover::voice::elevenlabs::PREVIEW_TEXT
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"sample".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElevenLabsClient::new("el-key".to_string()).with_base_url(server.uri());
        assert_eq!(client.preview("voice-9", None).await.unwrap(), b"sample");
    }
}
