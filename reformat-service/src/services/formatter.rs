//! Prompt construction and CSV post-processing.

use super::template::Template;
use service_core::genai::{GenerateRequest, ProviderError, TextProvider};

/// One reformat job as received from the caller.
#[derive(Debug, Clone)]
pub struct FormatJob {
    pub data: String,
    pub prompt: String,
    pub model: String,
    pub api_key: String,
}

/// Compose the single prompt sent to the model.
pub fn build_prompt(template: &Template, prompt: &str, data: &str) -> String {
    format!(
        "You are a data formatting assistant.\n\
         Convert the raw data below into CSV rows with exactly these columns, in this order:\n\
         {headers}\n\n\
         Example row:\n\
         {sample}\n\n\
         Instructions: {prompt}\n\n\
         Raw data:\n\
         {data}\n\n\
         Respond with CSV rows only, one record per line, without the header line.",
        headers = template.header_line(),
        sample = template.sample_row,
        prompt = prompt,
        data = data,
    )
}

/// Normalise the model output: drop blank lines, trim every field and put the
/// header line on top. Fields are not validated against the header count.
pub fn post_process(header_line: &str, text: &str) -> String {
    let rows = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(',').map(str::trim).collect::<Vec<_>>().join(","));

    let mut out: Vec<String> = Vec::new();
    if !header_line.is_empty() {
        out.push(header_line.to_string());
    }
    out.extend(rows);
    out.join("\n")
}

/// Run one reformat job against `provider` using the caller's model and key.
pub async fn format_data(
    provider: &dyn TextProvider,
    template: &Template,
    job: &FormatJob,
) -> Result<String, ProviderError> {
    let request = GenerateRequest {
        model: job.model.clone(),
        parts: vec![build_prompt(template, &job.prompt, &job.data)],
        cached_content: None,
        api_key: Some(job.api_key.clone()),
    };

    let response = provider.generate(&request).await?;
    tracing::debug!(
        model = %job.model,
        output_tokens = response.output_tokens,
        "Received reformatted data"
    );

    Ok(post_process(&template.header_line(), &response.text))
}
