// src/services/generator.rs

//! Client for the external text-generation service.
//!
//! The model is asked for a JSON document but answers in free text, so the
//! payload is cut out of the response (first `{` to last `}`) and parsed
//! strictly. Nothing here retries: every failure is terminal for the request.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{config::Config, models::question::QuestionType};

/// Failure modes of a generation call.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The service could not be reached or answered with an error.
    #[error("generation service failed: {0}")]
    Failure(String),

    /// The service answered but no usable exam payload could be extracted.
    #[error("could not parse generated exam: {0}")]
    Parse(String),

    #[error("generation service timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    /// Same failure kind with the detail replaced by generic wording.
    pub fn redacted(self) -> Self {
        match self {
            GenerationError::Failure(_) => {
                GenerationError::Failure("the service is unavailable".to_string())
            }
            GenerationError::Parse(_) => {
                GenerationError::Parse("the service returned an invalid exam".to_string())
            }
            GenerationError::Timeout(d) => GenerationError::Timeout(d),
        }
    }
}

/// Parameters sent to the generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub subject: String,
    pub grade: String,
    pub question_types: Vec<QuestionType>,
    pub question_count: u32,
    pub topics: Option<String>,
}

/// The structured exam extracted from a model response.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedExam {
    #[serde(rename = "questoes")]
    pub questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuestion {
    /// Number as reported by the model. Persisted numbering comes from array order.
    #[serde(rename = "numero", default)]
    pub number: Option<u32>,

    #[serde(rename = "tipo")]
    pub question_type: QuestionType,

    #[serde(rename = "enunciado")]
    pub prompt: String,

    #[serde(rename = "alternativas", default)]
    pub choices: Option<Vec<String>>,

    #[serde(rename = "resposta_correta", default)]
    pub correct_answer: Option<String>,

    #[serde(rename = "explicacao", default)]
    pub explanation: Option<String>,
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedExam, GenerationError>;
}

/// Extracts the exam payload embedded in a free-text model response.
pub fn extract_exam_payload(raw: &str) -> Result<GeneratedExam, GenerationError> {
    let start = raw.find('{');
    let end = raw.rfind('}');

    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            return Err(GenerationError::Parse(
                "no JSON object found in response".to_string(),
            ));
        }
    };

    let exam: GeneratedExam =
        serde_json::from_str(json).map_err(|e| GenerationError::Parse(e.to_string()))?;

    for (index, question) in exam.questions.iter().enumerate() {
        if question.question_type == QuestionType::MultipleChoice
            && question.choices.as_ref().is_none_or(|c| c.is_empty())
        {
            return Err(GenerationError::Parse(format!(
                "question {} is multiple choice but has no choices",
                index + 1
            )));
        }
    }

    Ok(exam)
}

/// Matches the generated list to the requested size.
///
/// Extra questions are dropped; a short list is rejected.
pub fn reconcile_count(
    mut exam: GeneratedExam,
    requested: u32,
) -> Result<GeneratedExam, GenerationError> {
    let requested = requested as usize;
    if exam.questions.len() < requested {
        return Err(GenerationError::Parse(format!(
            "expected {} questions, got {}",
            requested,
            exam.questions.len()
        )));
    }
    if exam.questions.len() > requested {
        tracing::warn!(
            "Generator returned {} questions, keeping the first {}",
            exam.questions.len(),
            requested
        );
        exam.questions.truncate(requested);
    }
    Ok(exam)
}

/// Builds the natural-language instruction for the model.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let types = request
        .question_types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let topics = match &request.topics {
        Some(topics) if !topics.trim().is_empty() => format!("Tópicos específicos: {}\n", topics),
        _ => String::new(),
    };

    format!(
        r#"Você é um professor especialista em {subject} para {grade}.

Crie uma prova completa com {count} questões seguindo estas especificações:

Disciplina: {subject}
Série: {grade}
Número de questões: {count}
Tipos de questões: {types}
{topics}
Para cada questão, forneça:
1. Número da questão
2. Tipo da questão (multipla_escolha, verdadeiro_falso ou dissertativa)
3. Enunciado claro e objetivo
4. Alternativas (para múltipla escolha)
5. Resposta correta
6. Explicação detalhada da resposta

Responda em formato JSON válido com a seguinte estrutura:
{{
    "questoes": [
        {{
            "numero": 1,
            "tipo": "multipla_escolha",
            "enunciado": "Pergunta aqui?",
            "alternativas": ["A) Opção 1", "B) Opção 2", "C) Opção 3", "D) Opção 4"],
            "resposta_correta": "B",
            "explicacao": "Explicação detalhada da resposta"
        }}
    ]
}}

Certifique-se de que:
- As questões são apropriadas para o nível da série
- As alternativas são plausíveis
- As explicações são educativas
- O JSON é válido e bem formatado
"#,
        subject = request.subject,
        grade = request.grade,
        count = request.question_count,
        types = types,
        topics = topics,
    )
}

// Gemini `generateContent` wire types.

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

/// Generator backed by the Gemini REST API.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(config.generation_timeout)
            .build()
            .map_err(|e| GenerationError::Failure(e.to_string()))?;

        let endpoint = config
            .gemini_base_url
            .join(&format!(
                "v1beta/models/{}:generateContent",
                config.gemini_model
            ))
            .map_err(|e| GenerationError::Failure(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.gemini_api_key.clone(),
            timeout: config.generation_timeout,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String, GenerationError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: Some(prompt) }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Failure(format!(
                "API error {}: {}",
                status, text
            )));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| self.classify(e))?;

        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<String>();

        if text.is_empty() {
            return Err(GenerationError::Failure(
                "generation service returned an empty response".to_string(),
            ));
        }

        Ok(text)
    }

    fn classify(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::Failure(err.to_string())
        }
    }
}

#[async_trait]
impl QuestionGenerator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedExam, GenerationError> {
        tracing::debug!(
            "Requesting {} questions on '{}' for '{}'",
            request.question_count,
            request.subject,
            request.grade
        );

        let raw = self.complete(build_prompt(request)).await?;
        extract_exam_payload(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(question_type: QuestionType) -> GeneratedQuestion {
        GeneratedQuestion {
            number: None,
            question_type,
            prompt: "?".to_string(),
            choices: None,
            correct_answer: None,
            explanation: None,
        }
    }

    #[test]
    fn test_extract_payload_surrounded_by_prose() {
        let raw = "Here is the exam: {\"questoes\":[{\"numero\":1,\"tipo\":\"multipla_escolha\",\"enunciado\":\"2+2=?\",\"alternativas\":[\"A) 3\",\"B) 4\"],\"resposta_correta\":\"B\",\"explicacao\":\"because\"}]} Thanks!";

        let exam = extract_exam_payload(raw).unwrap();
        assert_eq!(exam.questions.len(), 1);

        let q = &exam.questions[0];
        assert_eq!(q.number, Some(1));
        assert_eq!(q.question_type, QuestionType::MultipleChoice);
        assert_eq!(q.correct_answer.as_deref(), Some("B"));
        assert_eq!(q.explanation.as_deref(), Some("because"));
        assert_eq!(q.choices.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_extract_payload_without_braces_fails() {
        let err = extract_exam_payload("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, GenerationError::Parse(_)));
    }

    #[test]
    fn test_extract_payload_reversed_braces_fails() {
        let err = extract_exam_payload("} nothing here {").unwrap_err();
        assert!(matches!(err, GenerationError::Parse(_)));
    }

    #[test]
    fn test_extract_payload_invalid_json_carries_parser_message() {
        let err = extract_exam_payload("```json\n{\"questoes\": [ }\n```").unwrap_err();
        match err {
            GenerationError::Parse(msg) => assert!(!msg.is_empty()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_extract_payload_rejects_unknown_type() {
        let raw = r#"{"questoes":[{"numero":1,"tipo":"ensaio","enunciado":"x"}]}"#;
        assert!(matches!(
            extract_exam_payload(raw),
            Err(GenerationError::Parse(_))
        ));
    }

    #[test]
    fn test_extract_payload_rejects_choice_question_without_choices() {
        let raw = r#"{"questoes":[{"numero":1,"tipo":"multipla_escolha","enunciado":"x","alternativas":[]}]}"#;
        assert!(matches!(
            extract_exam_payload(raw),
            Err(GenerationError::Parse(_))
        ));
    }

    #[test]
    fn test_extract_payload_accepts_null_optionals() {
        let raw = r#"{"questoes":[{"numero":1,"tipo":"dissertativa","enunciado":"Explique.","alternativas":null,"resposta_correta":null}]}"#;
        let exam = extract_exam_payload(raw).unwrap();
        assert_eq!(exam.questions[0].question_type, QuestionType::FreeResponse);
        assert!(exam.questions[0].correct_answer.is_none());
    }

    #[test]
    fn test_reconcile_truncates_extra_questions() {
        let exam = GeneratedExam {
            questions: vec![
                question(QuestionType::TrueFalse),
                question(QuestionType::TrueFalse),
                question(QuestionType::FreeResponse),
            ],
        };
        let exam = reconcile_count(exam, 2).unwrap();
        assert_eq!(exam.questions.len(), 2);
    }

    #[test]
    fn test_reconcile_rejects_short_list() {
        let exam = GeneratedExam {
            questions: vec![question(QuestionType::TrueFalse)],
        };
        assert!(matches!(
            reconcile_count(exam, 3),
            Err(GenerationError::Parse(_))
        ));
    }

    #[test]
    fn test_prompt_embeds_parameters() {
        let prompt = build_prompt(&GenerationRequest {
            subject: "Matemática".to_string(),
            grade: "5º ano".to_string(),
            question_types: vec![QuestionType::MultipleChoice, QuestionType::TrueFalse],
            question_count: 7,
            topics: Some("frações".to_string()),
        });

        assert!(prompt.contains("Matemática"));
        assert!(prompt.contains("5º ano"));
        assert!(prompt.contains("7 questões"));
        assert!(prompt.contains("multipla_escolha, verdadeiro_falso"));
        assert!(prompt.contains("Tópicos específicos: frações"));
        assert!(prompt.contains("\"questoes\""));
    }

    #[test]
    fn test_redacted_keeps_kind() {
        let err = GenerationError::Parse("line 3 column 9".to_string()).redacted();
        match err {
            GenerationError::Parse(msg) => assert!(!msg.contains("line 3")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    // Local stand-in for the Gemini endpoint; every POST gets `reply`.
    async fn serve_gemini<H, T>(reply: H) -> Url
    where
        H: axum::handler::Handler<T, ()>,
        T: 'static,
    {
        let app = axum::Router::new().fallback(reply);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        crate::config::parse_base_url(&format!("http://127.0.0.1:{}", port)).unwrap()
    }

    fn client_for(base_url: Url, timeout: Duration) -> GeminiClient {
        let local = crate::config::parse_base_url("http://127.0.0.1:9").unwrap();
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "secret".to_string(),
            rust_log: "error".to_string(),
            debug: true,
            bind_addr: "127.0.0.1:0".to_string(),
            cors_origins: Vec::new(),
            gemini_api_key: "key".to_string(),
            gemini_model: "test-model".to_string(),
            gemini_base_url: base_url,
            generation_timeout: timeout,
            mercado_pago_access_token: String::new(),
            mercado_pago_base_url: local.clone(),
            public_base_url: local,
        };
        GeminiClient::new(&config).unwrap()
    }

    fn one_question_request() -> GenerationRequest {
        GenerationRequest {
            subject: "Ciências".to_string(),
            grade: "6º ano".to_string(),
            question_types: vec![QuestionType::TrueFalse],
            question_count: 1,
            topics: None,
        }
    }

    #[tokio::test]
    async fn test_gemini_slow_reply_is_timeout() {
        let base = serve_gemini(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            axum::Json(serde_json::json!({ "candidates": [] }))
        })
        .await;
        let client = client_for(base, Duration::from_millis(200));

        let err = client.generate(&one_question_request()).await.unwrap_err();
        assert!(
            matches!(err, GenerationError::Timeout(d) if d == Duration::from_millis(200)),
            "unexpected error: {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_gemini_error_status_is_failure() {
        let base = serve_gemini(|| async {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "quota exceeded",
            )
        })
        .await;
        let client = client_for(base, Duration::from_secs(5));

        match client.generate(&one_question_request()).await.unwrap_err() {
            GenerationError::Failure(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gemini_empty_candidates_is_failure() {
        let base = serve_gemini(|| async { axum::Json(serde_json::json!({ "candidates": [] })) }).await;
        let client = client_for(base, Duration::from_secs(5));

        let err = client.generate(&one_question_request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Failure(_)), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_gemini_joins_parts_before_extracting() {
        let base = serve_gemini(|| async {
            axum::Json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            { "text": "Claro! Aqui está: {\"questoes\":[{\"numero\":1," },
                            { "text": "\"tipo\":\"verdadeiro_falso\",\"enunciado\":\"A água ferve a 100 °C.\",\"resposta_correta\":\"V\"}]} Bons estudos." }
                        ]
                    }
                }]
            }))
        })
        .await;
        let client = client_for(base, Duration::from_secs(5));

        let exam = client.generate(&one_question_request()).await.unwrap();
        assert_eq!(exam.questions.len(), 1);
        assert_eq!(exam.questions[0].question_type, QuestionType::TrueFalse);
        assert_eq!(exam.questions[0].correct_answer.as_deref(), Some("V"));
    }
}
