use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_INDEX_EXPRESSION: &str = "'^/STEP_INDEX.CV' := {index};";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub initial_x: i32,
    pub initial_y: i32,
    pub pitch: i32,
    pub branch_spacing: i32,
    pub task_pointer_spacing: i32,
    pub step_height: i32,
    pub step_width: i32,
    pub transition_offset_x: i32,
    pub left_task_pointer_commands: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            initial_x: 160,
            initial_y: 40,
            pitch: 70,
            branch_spacing: 200,
            task_pointer_spacing: 300,
            step_height: 40,
            step_width: 100,
            transition_offset_x: 50,
            left_task_pointer_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    pub step_prefix: String,
    pub transition_prefix: String,
    pub max_name_length: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            step_prefix: "S".to_string(),
            transition_prefix: "T".to_string(),
            max_name_length: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexActionConfig {
    pub qualifier: String,
    pub expression: String,
    pub description: String,
}

impl Default for IndexActionConfig {
    fn default() -> Self {
        Self {
            qualifier: "P".to_string(),
            expression: DEFAULT_INDEX_EXPRESSION.to_string(),
            description: "Step index".to_string(),
        }
    }
}

impl IndexActionConfig {
    pub fn expression_for(&self, index: usize) -> String {
        self.expression.replace("{index}", &index.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub layout: LayoutConfig,
    pub naming: NamingConfig,
    pub index_action: IndexActionConfig,
    pub skip_blocks: Vec<String>,
}

impl Config {
    pub fn skips(&self, block: &str) -> bool {
        self.skip_blocks.iter().any(|name| name == block)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    initial_x: Option<i32>,
    initial_y: Option<i32>,
    pitch: Option<i32>,
    branch_spacing: Option<i32>,
    task_pointer_spacing: Option<i32>,
    step_height: Option<i32>,
    step_width: Option<i32>,
    transition_offset_x: Option<i32>,
    left_task_pointer_commands: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamingConfigFile {
    step_prefix: Option<String>,
    transition_prefix: Option<String>,
    max_name_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexActionConfigFile {
    qualifier: Option<String>,
    expression: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    naming: Option<NamingConfigFile>,
    index_action: Option<IndexActionConfigFile>,
    skip_blocks: Option<Vec<String>>,
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = serde_json::from_str(contents).map_err(|source| Error::Json {
        what: "config file",
        source,
    })?;

    if let Some(layout) = parsed.layout {
        let target = &mut config.layout;
        if let Some(v) = layout.initial_x {
            target.initial_x = v;
        }
        if let Some(v) = layout.initial_y {
            target.initial_y = v;
        }
        if let Some(v) = layout.pitch {
            target.pitch = v;
        }
        if let Some(v) = layout.branch_spacing {
            target.branch_spacing = v;
        }
        if let Some(v) = layout.task_pointer_spacing {
            target.task_pointer_spacing = v;
        }
        if let Some(v) = layout.step_height {
            target.step_height = v;
        }
        if let Some(v) = layout.step_width {
            target.step_width = v;
        }
        if let Some(v) = layout.transition_offset_x {
            target.transition_offset_x = v;
        }
        if let Some(v) = layout.left_task_pointer_commands {
            target.left_task_pointer_commands = v;
        }
    }

    if let Some(naming) = parsed.naming {
        if let Some(v) = naming.step_prefix {
            config.naming.step_prefix = v;
        }
        if let Some(v) = naming.transition_prefix {
            config.naming.transition_prefix = v;
        }
        if let Some(v) = naming.max_name_length {
            config.naming.max_name_length = v;
        }
    }

    if let Some(index_action) = parsed.index_action {
        if let Some(v) = index_action.qualifier {
            config.index_action.qualifier = v;
        }
        if let Some(v) = index_action.expression {
            config.index_action.expression = v;
        }
        if let Some(v) = index_action.description {
            config.index_action.description = v;
        }
    }

    if let Some(skip) = parsed.skip_blocks {
        config.skip_blocks = skip;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let config = parse_config(
            r#"{
                "layout": { "branchSpacing": 150, "leftTaskPointerCommands": ["ABORT"] },
                "skipBlocks": ["__LEGACY__"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.layout.branch_spacing, 150);
        assert_eq!(config.layout.pitch, LayoutConfig::default().pitch);
        assert_eq!(config.layout.left_task_pointer_commands, vec!["ABORT"]);
        assert!(config.skips("__LEGACY__"));
        assert_eq!(config.naming.max_name_length, 16);
    }

    #[test]
    fn index_expression_template() {
        let config = IndexActionConfig::default();
        assert_eq!(config.expression_for(3), "'^/STEP_INDEX.CV' := 3;");
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            parse_config("{ layout: "),
            Err(Error::Json { what: "config file", .. })
        ));
    }
}
