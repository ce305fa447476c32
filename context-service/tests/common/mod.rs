use context_service::config::{
    CacheConfig, ContextConfig, GoogleConfig, StorageBackend, StorageConfig,
};
use context_service::services::LocalStorage;
use context_service::startup::{build_router, AppState};
use axum::Router;
use service_core::config::Config as CoreConfig;
use service_core::genai::MockGenAi;
use std::sync::Arc;
use tempfile::TempDir;

pub const CONTEXT_OBJECT: &[u8] = b"ACME Corp,acme-001\nGlobex,globex-002\n";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mock: Arc<MockGenAi>,
    pub config: ContextConfig,
    pub storage_dir: TempDir,
    pub scratch_dir: TempDir,
}

pub fn test_config(storage_dir: &TempDir, scratch_dir: &TempDir) -> ContextConfig {
    ContextConfig {
        common: CoreConfig { port: 0 },
        google: GoogleConfig {
            api_key: "test-api-key".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
        },
        storage: StorageConfig {
            backend: StorageBackend::Local,
            local_path: storage_dir.path().to_string_lossy().into_owned(),
            s3_bucket: None,
            s3_region: None,
            object_key: "context.txt".to_string(),
        },
        cache: CacheConfig {
            model: "models/gemini-1.5-flash-001".to_string(),
            ttl_seconds: 3600,
            scratch_dir: scratch_dir.path().to_string_lossy().into_owned(),
            display_name: "Large Context File".to_string(),
            initial_name: None,
        },
    }
}

impl TestApp {
    pub async fn spawn(mock: MockGenAi) -> Self {
        Self::spawn_with_handle(mock, None).await
    }

    pub async fn spawn_with_handle(mock: MockGenAi, handle: Option<&str>) -> Self {
        let storage_dir = tempfile::tempdir().expect("Failed to create storage dir");
        let scratch_dir = tempfile::tempdir().expect("Failed to create scratch dir");
        tokio::fs::write(storage_dir.path().join("context.txt"), CONTEXT_OBJECT)
            .await
            .expect("Failed to write context object");

        let mut config = test_config(&storage_dir, &scratch_dir);
        config.cache.initial_name = handle.map(|h| h.to_string());

        let mock = Arc::new(mock);
        let storage = Arc::new(
            LocalStorage::new(storage_dir.path())
                .await
                .expect("Failed to create local storage"),
        );
        let state = AppState::new(&config, storage, mock.clone());
        let router = build_router(state.clone());

        TestApp {
            router,
            state,
            mock,
            config,
            storage_dir,
            scratch_dir,
        }
    }

    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch_dir.path())
            .expect("Failed to read scratch dir")
            .next()
            .is_none()
    }
}
