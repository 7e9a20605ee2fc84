use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::EventError;
use crate::util::url::normalize_url;

const UNKNOWN_RESULT: &str = "UNKNOWN";

/// A stage-status notification as delivered by the CI host, flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatusEvent {
    pipeline_name: String,
    pipeline_counter: String,
    stage_name: String,
    stage_counter: String,
    stage_state: String,
    stage_result: String,
    create_time: String,
    last_transition_time: String,
}

/// Body posted to the badge server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgePayload {
    pub pipeline: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    pipeline: RawPipeline,
}

#[derive(Debug, Deserialize)]
struct RawPipeline {
    name: String,
    #[serde(default, deserialize_with = "deserialize_counter")]
    counter: String,
    stage: RawStage,
}

#[derive(Debug, Deserialize)]
struct RawStage {
    name: String,
    #[serde(default, deserialize_with = "deserialize_counter")]
    counter: String,
    #[serde(default)]
    state: String,
    result: String,
    #[serde(default, rename = "create-time")]
    create_time: String,
    #[serde(default, rename = "last-transition-time")]
    last_transition_time: String,
}

impl From<RawEvent> for StageStatusEvent {
    fn from(value: RawEvent) -> Self {
        let RawPipeline {
            name,
            counter,
            stage,
        } = value.pipeline;
        Self {
            pipeline_name: name,
            pipeline_counter: counter,
            stage_name: stage.name,
            stage_counter: stage.counter,
            stage_state: stage.state,
            stage_result: stage.result,
            create_time: stage.create_time,
            last_transition_time: stage.last_transition_time,
        }
    }
}

impl StageStatusEvent {
    /// Parse a host request body.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Parse`] when the body is not JSON or lacks the
    /// pipeline name, stage name or stage result.
    pub fn from_json(body: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice::<RawEvent>(body)
            .map(Self::from)
            .map_err(|source| EventError::Parse { source })
    }

    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    #[must_use]
    pub fn pipeline_counter(&self) -> &str {
        &self.pipeline_counter
    }

    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    #[must_use]
    pub fn stage_counter(&self) -> &str {
        &self.stage_counter
    }

    #[must_use]
    pub fn stage_state(&self) -> &str {
        &self.stage_state
    }

    #[must_use]
    pub fn stage_result(&self) -> &str {
        &self.stage_result
    }

    #[must_use]
    pub fn create_time(&self) -> &str {
        &self.create_time
    }

    #[must_use]
    pub fn last_transition_time(&self) -> &str {
        &self.last_transition_time
    }

    /// `pipeline/pipelineCounter/stage/stageCounter`
    #[must_use]
    pub fn fully_qualified_job_name(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.pipeline_name, self.pipeline_counter, self.stage_name, self.stage_counter
        )
    }

    #[must_use]
    pub fn is_unknown_result(&self) -> bool {
        is_unknown_status(&self.stage_result)
    }

    /// The badge update for this event, or `None` when the result is unknown.
    #[must_use]
    pub fn badge_payload(&self) -> Option<BadgePayload> {
        (!self.is_unknown_result()).then(|| BadgePayload {
            pipeline: self.pipeline_name.clone(),
            status: self.stage_result.clone(),
        })
    }

    /// Link to this stage run on the CI host.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `host` is not an absolute URL.
    pub fn go_server_url(&self, host: &str) -> Result<Url, url::ParseError> {
        normalize_url(&format!(
            "{host}/go/pipelines/{}/{}/{}/{}",
            self.pipeline_name, self.pipeline_counter, self.stage_name, self.stage_counter
        ))
    }

    /// Link to the pipeline history API on the CI host.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `host` is not an absolute URL.
    pub fn go_history_url(&self, host: &str) -> Result<Url, url::ParseError> {
        normalize_url(&format!(
            "{host}/go/api/pipelines/{}/history",
            self.pipeline_name
        ))
    }
}

/// True when `status` is the host's `UNKNOWN` sentinel, ignoring ASCII case.
#[must_use]
pub fn is_unknown_status(status: &str) -> bool {
    status.eq_ignore_ascii_case(UNKNOWN_RESULT)
}

fn deserialize_counter<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Counter {
        Str(String),
        Int(u64),
        Null,
    }

    Ok(match Counter::deserialize(de)? {
        Counter::Str(value) => value,
        Counter::Int(value) => value.to_string(),
        Counter::Null => String::new(),
    })
}
