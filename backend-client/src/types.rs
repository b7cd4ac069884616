use serde::Deserialize;
use serde::Serialize;

/// Start request for a bulk rewrite job.
///
/// `api_key` carries the wrapped form; wrapping happens before the params
/// are handed to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteJobParams {
    pub session_uid: String,
    pub item_ids: Vec<String>,
    pub fields: Vec<String>,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Start request for a bulk autoscore job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscoreJobParams {
    pub session_uid: String,
    pub item_ids: Vec<String>,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Start request for a reasoning-content migration job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateReasoningJobParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_uid: Option<String>,
}

/// Start request for a bulk item-removal job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveItemsJobParams {
    pub session_uid: String,
    pub item_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartJobResponse {
    #[serde(alias = "id")]
    pub job_id: String,
}
