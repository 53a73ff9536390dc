//! Agent definitions handed to the hosted reasoning engine.
//!
//! Each agent is a versioned YAML document under `agents/`. The catalog is
//! configuration, not control flow: delegation between agents happens inside
//! the hosted runtime. Validation only checks that the documents hang together.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::tools::ToolRegistry;

const BUILTIN: [(&str, &str); 4] = [
    ("trip_manager.yaml", include_str!("../agents/trip_manager.yaml")),
    (
        "trip_requirement_analyst.yaml",
        include_str!("../agents/trip_requirement_analyst.yaml"),
    ),
    ("place_analyst.yaml", include_str!("../agents/place_analyst.yaml")),
    (
        "itinerary_generator_analyst.yaml",
        include_str!("../agents/itinerary_generator_analyst.yaml"),
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub version: u32,
    pub model: String,
    pub description: String,
    pub instruction: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub sub_agents: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to parse agent document {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("agent '{0}' is defined more than once")]
    DuplicateName(String),
    #[error("agent '{agent}' uses unknown tool '{tool}'")]
    UnknownTool { agent: String, tool: String },
    #[error("agent '{agent}' delegates to unknown agent '{sub_agent}'")]
    UnknownSubAgent { agent: String, sub_agent: String },
    #[error("agent delegation forms a cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("expected exactly one root agent, found [{}]", .0.join(", "))]
    RootCount(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentCatalog {
    agents: Vec<AgentDefinition>,
}

impl AgentCatalog {
    /// Parse `(file name, YAML)` pairs, keeping their order.
    pub fn from_documents(documents: &[(&str, &str)]) -> Result<Self, CatalogError> {
        let agents = documents
            .iter()
            .map(|(file, source)| {
                serde_yaml::from_str(source).map_err(|source| CatalogError::Parse {
                    file: (*file).to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<AgentDefinition>, _>>()?;
        Ok(Self { agents })
    }

    /// The definitions compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_documents(&BUILTIN)
    }

    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Agents no other agent delegates to.
    pub fn roots(&self) -> Vec<&AgentDefinition> {
        let referenced: BTreeSet<&str> = self
            .agents
            .iter()
            .flat_map(|a| a.sub_agents.iter().map(String::as_str))
            .collect();
        self.agents
            .iter()
            .filter(|a| !referenced.contains(a.name.as_str()))
            .collect()
    }

    pub fn root(&self) -> Option<&AgentDefinition> {
        let roots = self.roots();
        match roots.as_slice() {
            [root] => Some(*root),
            _ => None,
        }
    }

    /// Check names, tool and sub-agent references, acyclicity and the single root.
    pub fn validate(&self, tools: &ToolRegistry) -> Result<(), CatalogError> {
        let mut by_name: BTreeMap<&str, &AgentDefinition> = BTreeMap::new();
        for agent in &self.agents {
            if by_name.insert(agent.name.as_str(), agent).is_some() {
                return Err(CatalogError::DuplicateName(agent.name.clone()));
            }
        }

        for agent in &self.agents {
            if let Some(tool) = agent.tools.iter().find(|t| !tools.contains(t)) {
                return Err(CatalogError::UnknownTool {
                    agent: agent.name.clone(),
                    tool: tool.clone(),
                });
            }
            if let Some(sub) = agent
                .sub_agents
                .iter()
                .find(|s| !by_name.contains_key(s.as_str()))
            {
                return Err(CatalogError::UnknownSubAgent {
                    agent: agent.name.clone(),
                    sub_agent: sub.clone(),
                });
            }
        }

        let mut done = BTreeSet::new();
        for agent in &self.agents {
            let mut path = Vec::new();
            find_cycle(agent.name.as_str(), &by_name, &mut path, &mut done)?;
        }

        let roots = self.roots();
        if roots.len() != 1 {
            return Err(CatalogError::RootCount(
                roots.iter().map(|a| a.name.clone()).collect(),
            ));
        }
        Ok(())
    }

    /// YAML rendering of every definition.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.agents)
    }
}

/// Depth-first walk; `path` is the current delegation chain.
fn find_cycle<'a>(
    name: &'a str,
    by_name: &BTreeMap<&'a str, &'a AgentDefinition>,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Result<(), CatalogError> {
    if let Some(start) = path.iter().position(|n| *n == name) {
        let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
        cycle.push(name.to_string());
        return Err(CatalogError::Cycle(cycle));
    }
    if done.contains(name) {
        return Ok(());
    }

    path.push(name);
    if let Some(agent) = by_name.get(name).copied() {
        for sub in &agent.sub_agents {
            find_cycle(sub.as_str(), by_name, path, done)?;
        }
    }
    path.pop();
    done.insert(name);
    Ok(())
}
