use axum::Router;
use reformat_service::config::RefreshPolicy;
use reformat_service::services::{Template, TemplateStore};
use reformat_service::startup::{build_router, AppState};
use service_core::genai::MockGenAi;
use std::sync::Arc;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mock: Arc<MockGenAi>,
}

pub fn name_age_template() -> Template {
    Template {
        headers: vec!["Name".to_string(), "Age".to_string()],
        sample_row: "Alice,30".to_string(),
    }
}

impl TestApp {
    pub fn spawn(mock: MockGenAi) -> Self {
        Self::spawn_with(mock, TemplateStore::with_template(name_age_template(), RefreshPolicy::Static))
    }

    pub fn spawn_with(mock: MockGenAi, templates: TemplateStore) -> Self {
        let mock = Arc::new(mock);
        let state = AppState {
            templates: Arc::new(templates),
            provider: mock.clone(),
        };
        let router = build_router(state.clone());

        TestApp {
            router,
            state,
            mock,
        }
    }
}
