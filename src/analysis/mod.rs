//! Document analysis via the Claude Messages API.
//!
//! Sends the raw PDF bytes together with a fixed instruction prompt in a
//! single deterministic (zero-temperature) call. OCR, language handling
//! and summarization all happen on the model side; this module only
//! builds the request and hands the raw text response to the extractor.

mod extract;

pub use extract::{extract, AnalysisResult, Extraction};

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-3-7-sonnet-20250219";
const MAX_TOKENS: u32 = 4000;

const SYSTEM_PROMPT: &str = "You are an expert document analyst with advanced OCR capabilities. You can extract information from any type of PDF, including image-based documents.";

/// Instruction prompt. `{{today}}` is replaced with the current date in
/// YYYYMMDD form before sending.
const ANALYSIS_PROMPT: &str = r#"You are an expert document analyst with advanced PDF processing and information extraction capabilities. Your task is to analyze a PDF document, perform OCR if necessary, and extract specific information. Today's date for reference is:

<todays_date>
{{today}}
</todays_date>

Please follow these steps to analyze the document:

1. OCR Processing:
   - Determine if OCR is necessary by assessing whether the PDF is image-based or if text can be easily extracted.
   - If OCR is needed, perform Optical Character Recognition (OCR) on the document.
   - Extract the text content from the PDF.

2. Document Analysis:
   Your goal is to extract and generate the following information:
   a. Document creation date (in YYYYMMDD format)
   b. Document title (50 characters or less)
   c. Document summary (approximately 500 characters)

   For each step of your analysis, wrap your thought process in <thought_process> tags.

   Step 0: Identify the document type or category
   <thought_process>
   - List key features or content that indicate the document type.
   - Propose 2-3 possible document categories based on these features.
   - Choose the most likely category and explain why.
   </thought_process>

   Step 1: Determine the document creation date
   <thought_process>
   - List all potential dates found in the document, including their context and format.
   - For each date, explain why it might or might not be the creation date, considering its format and surrounding context.
   - If no explicit date is found, explain how you inferred the date from the content.
   - If inference is not possible, use today's date and explain why.
   </thought_process>

   Step 2: Identify or generate the document title
   <thought_process>
   - Quote potential titles directly from the document.
   - Identify 3-5 key themes or keywords from the document content.
   - If generating a title, list 2-3 options based on these themes and keywords.
   - For each potential title, explain why it might be suitable or not.
   - Ensure the final chosen title is 50 characters or less.
   - Translate the final title into Japanese.
   </thought_process>

   Step 3: Summarize the document
   <thought_process>
   - Identify 3-5 main topics from the document.
   - For each main topic, list 1-2 subtopics or key points.
   - Quote 3-5 key passages from the document that represent these main points.
   - Create a concise summary of approximately 500 characters based on these topics and key points.
   - Translate the summary into Japanese.
   </thought_process>

3. Output Format:
   After your analysis, provide the final output in JSON format with the following structure:

   {
     "date": "YYYYMMDD",
     "title": "文書タイトル (50文字以内)",
     "summary": "文書の要約 (約500文字)"
   }

   Ensure that both the title and summary in the JSON output are in Japanese.

Please begin your analysis now, starting with the OCR process if necessary, and then proceed with the document analysis steps. It's OK for each thought process section to be quite long."#;

/// Errors raised at the analysis boundary. API failures propagate to the
/// caller untouched - there is no local recovery for them.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to read PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error("Claude API connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Claude API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Claude response carried no text content")]
    EmptyResponse,
}

/// Claude Messages API request body.
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: &'static str,
    max_tokens: u32,
    temperature: f32,
    system: &'static str,
    messages: Vec<MessagePayload>,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "document")]
    Document { source: DocumentSource },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "base64")]
    Base64 { media_type: &'static str, data: String },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Client for the Claude document-analysis backend.
pub struct AnalysisClient {
    client: reqwest::Client,
    api_key: String,
}

impl AnalysisClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // large scans are slow to analyze
            .build()
            .expect("Failed to create HTTP client");

        Self { client, api_key }
    }

    /// Analyze a PDF file and return the normalized extraction.
    ///
    /// Today's date (local time, YYYYMMDD) parameterizes the prompt and
    /// doubles as the fallback date for normalization.
    pub async fn analyze(&self, pdf_path: &Path) -> Result<Extraction, AnalysisError> {
        info!("Analyzing PDF with Claude: {}", pdf_path.display());

        let pdf_data = tokio::fs::read(pdf_path).await?;
        let today = chrono::Local::now().format("%Y%m%d").to_string();

        let raw_response = self.request(&pdf_data, &today).await?;
        info!("Received response from Claude API");
        // Full responses can carry document content; keep them out of
        // normal-level logs.
        debug!("Full Claude response: {}", raw_response);

        Ok(extract(&raw_response, &today))
    }

    /// Submit one Messages API call and return the raw text response.
    async fn request(&self, pdf_data: &[u8], today: &str) -> Result<String, AnalysisError> {
        let request = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system: SYSTEM_PROMPT,
            messages: vec![MessagePayload {
                role: "user",
                content: vec![
                    ContentBlock::Text {
                        text: build_prompt(today),
                    },
                    ContentBlock::Document {
                        source: DocumentSource::Base64 {
                            media_type: "application/pdf",
                            data: base64::engine::general_purpose::STANDARD.encode(pdf_data),
                        },
                    },
                ],
            }],
        };

        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::Api { status, body });
        }

        let response: MessagesResponse = resp.json().await?;
        response
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .ok_or(AnalysisError::EmptyResponse)
    }
}

/// Fill the date placeholder in the instruction prompt.
fn build_prompt(today: &str) -> String {
    ANALYSIS_PROMPT.replace("{{today}}", today)
}
