//! Agent directory: fetches the selectable agents and tracks the selection.

use std::collections::HashSet;

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::protocol::{self, Agent, FALLBACK_AGENT};

/// HTTP client for `GET {base}/agents`.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    agents_url: Url,
}

impl DirectoryClient {
    pub fn new(base_url: &Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            agents_url: protocol::agents_url(base_url),
        }
    }

    /// Raw listing. Non-success statuses are errors.
    pub async fn list_agents(&self) -> Result<Vec<Agent>, ChatError> {
        debug!(url = %self.agents_url, "fetching agents");
        let resp = self
            .http
            .get(self.agents_url.clone())
            .send()
            .await
            .map_err(ChatError::from_reqwest)?
            .error_for_status()
            .map_err(ChatError::from_reqwest)?;
        resp.json::<Vec<Agent>>()
            .await
            .map_err(ChatError::from_reqwest)
    }

    /// Listing with the fallback policy applied. Never empty, never fails.
    pub async fn fetch(&self) -> Vec<Agent> {
        agents_or_fallback(self.list_agents().await)
    }
}

/// Apply the fallback policy to a fetch outcome: a failed or empty listing
/// becomes `[base_agent]`. Duplicate names keep their first occurrence.
pub fn agents_or_fallback(result: Result<Vec<Agent>, ChatError>) -> Vec<Agent> {
    let agents = match result {
        Ok(agents) => agents,
        Err(e) => {
            warn!(error = %e, "failed to fetch agents, using fallback");
            return vec![Agent::fallback()];
        }
    };

    let mut seen = HashSet::new();
    let unique: Vec<Agent> = agents
        .into_iter()
        .filter(|a| seen.insert(a.name.clone()))
        .collect();

    if unique.is_empty() {
        info!("agent directory is empty, using fallback");
        vec![Agent::fallback()]
    } else {
        unique
    }
}

type SelectCallback = Box<dyn FnMut(&str) + Send>;

/// Selector state: the current listing, the selected agent and whether a
/// fetch is outstanding.
pub struct AgentDirectory {
    agents: Vec<Agent>,
    selected: String,
    loading: bool,
    on_select: SelectCallback,
}

impl AgentDirectory {
    /// Seeded with the fallback agent so the selector is never empty.
    pub fn new(on_select: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            agents: vec![Agent::fallback()],
            selected: FALLBACK_AGENT.to_string(),
            loading: false,
            on_select: Box::new(on_select),
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.agents.iter().position(|a| a.name == self.selected)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Mark a fetch as started. Returns `false` if one is already in flight,
    /// in which case the caller must not start another.
    pub fn begin_fetch(&mut self) -> bool {
        if self.loading {
            debug!("agent refresh ignored, fetch already in flight");
            return false;
        }
        self.loading = true;
        true
    }

    /// Apply a fetch outcome and clear the in-flight flag. The selection is
    /// left untouched; only a user choice changes it.
    pub fn finish_fetch(&mut self, result: Result<Vec<Agent>, ChatError>) {
        self.agents = agents_or_fallback(result);
        self.loading = false;
        debug!(
            count = self.agents.len(),
            selected = %self.selected,
            "agent listing updated"
        );
    }

    /// Fetch and apply in one step. No-op while another fetch is in flight.
    pub async fn refresh(&mut self, client: &DirectoryClient) {
        if !self.begin_fetch() {
            return;
        }
        let result = client.list_agents().await;
        self.finish_fetch(result);
    }

    /// User picked `name` in the selector. Notifies the callback when the
    /// selection actually changes. Unknown names are ignored.
    pub fn select(&mut self, name: &str) -> bool {
        if !self.agents.iter().any(|a| a.name == name) {
            warn!(agent = name, "ignoring selection of unlisted agent");
            return false;
        }
        if self.selected == name {
            return false;
        }
        info!(agent = name, "agent selected");
        self.selected = name.to_string();
        (self.on_select)(name);
        true
    }
}

impl std::fmt::Debug for AgentDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDirectory")
            .field("agents", &self.agents)
            .field("selected", &self.selected)
            .field("loading", &self.loading)
            .finish_non_exhaustive()
    }
}
