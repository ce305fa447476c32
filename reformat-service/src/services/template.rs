//! The CSV header/sample template and its refresh policy.

use crate::config::RefreshPolicy;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template URL not configured")]
    NotConfigured,

    #[error("Template fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Template endpoint returned status {0}")]
    Status(u16),

    #[error("Template document has no header line")]
    Empty,

    #[error("Unsupported template document: {0}")]
    Unsupported(String),
}

/// Ordered column headers plus one example row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub headers: Vec<String>,
    pub sample_row: String,
}

impl Template {
    pub fn header_line(&self) -> String {
        self.headers.join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Parse a template document.
    ///
    /// Accepts a JSON object (keys are headers, values the sample row), a JSON
    /// array whose first element is such an object, a JSON string holding CSV
    /// text, or CSV text (header line, then sample line).
    pub fn parse(body: &str) -> Result<Self, TemplateError> {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => Self::from_object(&map),
            Ok(Value::Array(items)) => match items.first() {
                Some(Value::Object(map)) => Self::from_object(map),
                Some(other) => Err(TemplateError::Unsupported(format!(
                    "array of {}",
                    json_kind(other)
                ))),
                None => Err(TemplateError::Empty),
            },
            Ok(Value::String(text)) => Self::from_csv(&text),
            Ok(other) => Err(TemplateError::Unsupported(json_kind(&other).to_string())),
            Err(_) => Self::from_csv(body),
        }
    }

    fn from_object(map: &serde_json::Map<String, Value>) -> Result<Self, TemplateError> {
        if map.is_empty() {
            return Err(TemplateError::Empty);
        }

        let headers = map.keys().cloned().collect();
        let sample_row = map
            .values()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");

        Ok(Self {
            headers,
            sample_row,
        })
    }

    fn from_csv(text: &str) -> Result<Self, TemplateError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let header_line = lines.next().ok_or(TemplateError::Empty)?;
        let headers = header_line
            .split(',')
            .map(|h| h.trim().to_string())
            .collect();
        let sample_row = lines.next().unwrap_or_default().to_string();

        Ok(Self {
            headers,
            sample_row,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Holds the current template and fetches it from its endpoint.
pub struct TemplateStore {
    template: RwLock<Template>,
    url: Option<String>,
    policy: RefreshPolicy,
    client: reqwest::Client,
}

impl TemplateStore {
    pub fn new(url: Option<String>, policy: RefreshPolicy) -> Self {
        Self {
            template: RwLock::new(Template::default()),
            url,
            policy,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// A store preloaded with `template`.
    pub fn with_template(template: Template, policy: RefreshPolicy) -> Self {
        let store = Self::new(None, policy);
        Self {
            template: RwLock::new(template),
            ..store
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub async fn current(&self) -> Template {
        self.template.read().await.clone()
    }

    /// Startup fetch. Failure is logged and leaves the template empty.
    pub async fn initialize(&self) {
        match self.refresh().await {
            Ok(template) => tracing::info!(
                columns = template.headers.len(),
                "Loaded reformat template"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to load reformat template"),
        }
    }

    /// Fetch the template and replace the held one.
    ///
    /// On failure the previous template is kept.
    pub async fn refresh(&self) -> Result<Template, TemplateError> {
        let result = self.fetch().await;
        let outcome = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("reformat_template_fetches_total", "outcome" => outcome).increment(1);

        let template = result?;
        *self.template.write().await = template.clone();
        Ok(template)
    }

    async fn fetch(&self) -> Result<Template, TemplateError> {
        let url = self.url.as_deref().ok_or(TemplateError::NotConfigured)?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TemplateError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        Template::parse(&body)
    }

    /// Re-fetch in the background when the policy is periodic.
    pub fn spawn_refresh_task(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let RefreshPolicy::Periodic(period) = self.policy else {
            return None;
        };

        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the startup fetch covers it.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = store.refresh().await {
                    tracing::warn!(error = %e, "Periodic template refresh failed");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_json_object_in_key_order() {
        let template = Template::parse(r#"{"Name": "Alice", "Age": 30, "City": "Paris"}"#).unwrap();
        assert_eq!(template.headers, vec!["Name", "Age", "City"]);
        assert_eq!(template.sample_row, "Alice,30,Paris");
        assert_eq!(template.header_line(), "Name,Age,City");
    }

    #[test]
    fn parses_first_object_of_array() {
        let template =
            Template::parse(r#"[{"Name": "Alice", "Age": "30"}, {"Name": "Bob", "Age": "35"}]"#)
                .unwrap();
        assert_eq!(template.headers, vec!["Name", "Age"]);
        assert_eq!(template.sample_row, "Alice,30");
    }

    #[test]
    fn parses_csv_text_and_json_string() {
        let expected = Template {
            headers: vec!["Name".to_string(), "Age".to_string()],
            sample_row: "Alice,30".to_string(),
        };
        assert_eq!(Template::parse("Name, Age\nAlice,30\n").unwrap(), expected);
        assert_eq!(
            Template::parse(r#""Name,Age\nAlice,30""#).unwrap(),
            expected
        );
    }

    #[test]
    fn rejects_empty_and_scalar_documents() {
        assert!(matches!(Template::parse("  \n \n"), Err(TemplateError::Empty)));
        assert!(matches!(Template::parse("{}"), Err(TemplateError::Empty)));
        assert!(matches!(Template::parse("[{}]"), Err(TemplateError::Empty)));
        assert!(matches!(Template::parse("[]"), Err(TemplateError::Empty)));
        assert!(matches!(
            Template::parse("42"),
            Err(TemplateError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn refresh_replaces_template() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/template.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"Name": "Alice", "Age": "30"}"#),
            )
            .mount(&server)
            .await;

        let store = TemplateStore::new(
            Some(format!("{}/template.json", server.uri())),
            RefreshPolicy::Static,
        );
        store.initialize().await;

        let template = store.current().await;
        assert_eq!(template.headers, vec!["Name", "Age"]);
        assert_eq!(template.sample_row, "Alice,30");
    }

    #[tokio::test]
    async fn failed_startup_fetch_leaves_template_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = TemplateStore::new(Some(server.uri()), RefreshPolicy::Static);
        store.initialize().await;

        assert!(store.current().await.is_empty());
        assert!(matches!(
            store.refresh().await,
            Err(TemplateError::Status(503))
        ));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_template() {
        let previous = Template {
            headers: vec!["Name".to_string()],
            sample_row: "Alice".to_string(),
        };
        let store = TemplateStore::with_template(previous.clone(), RefreshPolicy::OnDemand);

        assert!(matches!(
            store.refresh().await,
            Err(TemplateError::NotConfigured)
        ));
        assert_eq!(store.current().await, previous);
    }

    #[tokio::test]
    async fn refresh_with_empty_object_keeps_previous_template() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let previous = Template {
            headers: vec!["Name".to_string()],
            sample_row: "Alice".to_string(),
        };
        let store = TemplateStore {
            url: Some(server.uri()),
            ..TemplateStore::with_template(previous.clone(), RefreshPolicy::OnDemand)
        };

        assert!(matches!(store.refresh().await, Err(TemplateError::Empty)));
        assert_eq!(store.current().await, previous);
    }

    #[tokio::test]
    async fn periodic_task_refetches_and_survives_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/template.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Name,Age\nAlice,30\n"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/template.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("Name,Age,City\nAlice,30,Paris\n"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/template.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = Arc::new(TemplateStore::new(
            Some(format!("{}/template.json", server.uri())),
            RefreshPolicy::Periodic(Duration::from_millis(50)),
        ));
        store.initialize().await;
        assert_eq!(store.current().await.headers, vec!["Name", "Age"]);

        let handle = store.spawn_refresh_task().unwrap();

        let mut refreshed = false;
        for _ in 0..100 {
            if store.current().await.headers.len() == 3 {
                refreshed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(refreshed, "periodic task never picked up the new template");

        // Later ticks hit the failing endpoint.
        let mut failed_ticks = false;
        for _ in 0..100 {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests.len() >= 4 {
                failed_ticks = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(failed_ticks);
        let template = store.current().await;
        assert_eq!(template.headers, vec!["Name", "Age", "City"]);
        assert_eq!(template.sample_row, "Alice,30,Paris");
    }

    #[tokio::test]
    async fn periodic_task_only_for_periodic_policy() {
        let store = Arc::new(TemplateStore::new(None, RefreshPolicy::Static));
        assert!(store.spawn_refresh_task().is_none());

        let store = Arc::new(TemplateStore::new(
            None,
            RefreshPolicy::Periodic(Duration::from_secs(3600)),
        ));
        let handle = store.spawn_refresh_task().unwrap();
        handle.abort();
    }
}
