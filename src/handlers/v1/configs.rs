//! Provider configuration CRUD and the provider catalog.

use axum::Json;
use axum::extract::{Path as PathExtract, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;
use uuid::Uuid;

use crate::api::{
    ConfigResponse, CreateConfigRequest, ListConfigsResponse, PageQuery, ProviderCatalogEntry,
    ProviderCatalogResponse, UpdateConfigRequest,
};
use crate::auth::Principal;
use crate::error::ChatError;
use crate::handlers::problem_details;
use crate::llm::ProviderKind;
use crate::server::AppState;
use crate::store::{NewProviderConfig, ProviderConfig, ProviderConfigUpdate};

/// GET /api/v1/configs
pub async fn list_configs(
    State(state): State<AppState>,
    principal: Principal,
    Query(page): Query<PageQuery>,
) -> Response {
    match state
        .store
        .configs_by_owner(&principal.id, page.skip, page.limit)
        .await
    {
        Ok(configs) => Json(ListConfigsResponse {
            configs: configs.iter().map(ConfigResponse::from).collect(),
        })
        .into_response(),
        Err(e) => ChatError::from(e).into_response(),
    }
}

/// POST /api/v1/configs
pub async fn create_config(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateConfigRequest>,
) -> Response {
    let name = req.name.trim();
    if name.is_empty() {
        return problem_details::unprocessable("name must not be empty").into_response();
    }
    if req.model.trim().is_empty() {
        return problem_details::unprocessable("model must not be empty").into_response();
    }

    match state
        .store
        .create_config(NewProviderConfig {
            owner: principal.id,
            name: name.to_string(),
            provider: req.provider,
            model: req.model.trim().to_string(),
            api_key: req.api_key,
            base_url: req.base_url,
            is_default: req.is_default,
        })
        .await
    {
        Ok(config) => (StatusCode::CREATED, Json(ConfigResponse::from(&config))).into_response(),
        Err(e) => {
            error!(error = %e, "failed to create config");
            ChatError::from(e).into_response()
        }
    }
}

/// GET /api/v1/configs/{config_id}
pub async fn get_config(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(config_id): PathExtract<Uuid>,
) -> Response {
    match owned_config(&state, &principal, config_id).await {
        Ok(config) => Json(ConfigResponse::from(&config)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// PUT /api/v1/configs/{config_id}
pub async fn update_config(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(config_id): PathExtract<Uuid>,
    Json(req): Json<UpdateConfigRequest>,
) -> Response {
    if let Err(e) = owned_config(&state, &principal, config_id).await {
        return e.into_response();
    }

    let update = ProviderConfigUpdate {
        name: req.name,
        model: req.model,
        api_key: req.api_key,
        base_url: req.base_url,
        is_default: req.is_default,
    };

    match state.store.update_config(config_id, update).await {
        Ok(config) => Json(ConfigResponse::from(&config)).into_response(),
        Err(e) => ChatError::from(e).into_response(),
    }
}

/// DELETE /api/v1/configs/{config_id}
pub async fn delete_config(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(config_id): PathExtract<Uuid>,
) -> Response {
    if let Err(e) = owned_config(&state, &principal, config_id).await {
        return e.into_response();
    }

    match state.store.delete_config(config_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(error = %e, "failed to delete config");
            ChatError::from(e).into_response()
        }
    }
}

/// GET /api/v1/providers
///
/// Superuser-only catalog of supported backends.
pub async fn provider_catalog(principal: Principal) -> Response {
    if !principal.is_superuser {
        return ChatError::Forbidden.into_response();
    }

    let providers = vec![
        ProviderCatalogEntry {
            provider: ProviderKind::OpenAi,
            requires_api_key: true,
            example_models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
        },
        ProviderCatalogEntry {
            provider: ProviderKind::Ollama,
            requires_api_key: false,
            example_models: vec!["llama3".to_string(), "qwen2".to_string()],
        },
        ProviderCatalogEntry {
            provider: ProviderKind::Mock,
            requires_api_key: false,
            example_models: vec!["mock".to_string()],
        },
    ];

    Json(ProviderCatalogResponse { providers }).into_response()
}

/// Ownership gate, reporting foreign configs as absent.
async fn owned_config(
    state: &AppState,
    principal: &Principal,
    config_id: Uuid,
) -> Result<ProviderConfig, ChatError> {
    let config = state
        .store
        .config(config_id)
        .await?
        .ok_or(ChatError::NotFound)?;
    if config.owner != principal.id {
        return Err(ChatError::NotFound);
    }
    Ok(config)
}
