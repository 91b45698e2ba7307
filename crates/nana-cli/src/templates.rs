//! Pipeline templates: reusable step lists stored as JSON files

use anyhow::Context;
use nana_pipeline::{PipelineMode, TaskDefinition};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A named, reusable pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub mode: PipelineMode,
    pub steps: Vec<TemplateStep>,
}

/// A step is either a bare prompt or a prompt pinned to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateStep {
    Prompt(String),
    Detailed {
        prompt: String,
        #[serde(default)]
        model: Option<String>,
    },
}

impl Template {
    pub fn tasks(&self) -> Vec<TaskDefinition> {
        self.steps
            .iter()
            .map(|step| match step {
                TemplateStep::Prompt(prompt) => TaskDefinition::new(prompt.as_str()),
                TemplateStep::Detailed { prompt, model } => {
                    let task = TaskDefinition::new(prompt.as_str());
                    match model {
                        Some(model) => task.with_model(model.as_str()),
                        None => task,
                    }
                }
            })
            .collect()
    }
}

/// Load every `*.json` template in `dir`, sorted by name.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_templates(dir: &Path) -> anyhow::Result<Vec<Template>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = dir.join("*.json");
    let pattern = pattern
        .to_str()
        .context("templates directory is not valid UTF-8")?;

    let mut templates = Vec::new();
    for path in glob::glob(pattern)?.filter_map(Result::ok) {
        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<Template>(&content)?));
        match parsed {
            Ok(template) => templates.push(template),
            Err(e) => tracing::warn!(path = %path.display(), "skipping template: {}", e),
        }
    }
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(templates)
}

/// Templates for one mode (or all of them)
pub fn filter_by_mode(templates: &[Template], mode: Option<PipelineMode>) -> Vec<&Template> {
    templates
        .iter()
        .filter(|t| mode.is_none_or(|m| t.mode == m))
        .collect()
}

/// Find a template by name, ignoring case
pub fn find<'a>(templates: &'a [Template], name: &str) -> Option<&'a Template> {
    templates.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}
