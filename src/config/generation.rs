use serde::Deserialize;
use std::path::Path;

/// Parameters for procedural world generation.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationParams {
    /// RNG seed; 0 means "pick a random seed".
    #[serde(default)]
    pub seed: u64,
    /// Side length of the square world grid.
    #[serde(default = "default_world_size")]
    pub world_size: u32,
    /// Probability that a cell holds a resource tile, split evenly
    /// between matterite and energite.
    #[serde(default = "default_resource_probability")]
    pub resource_probability: f64,
}

fn default_world_size() -> u32 {
    100
}
fn default_resource_probability() -> f64 {
    0.1
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            seed: 0,
            world_size: default_world_size(),
            resource_probability: default_resource_probability(),
        }
    }
}

impl GenerationParams {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let params: GenerationParams =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.world_size == 0 {
            errors.push(format!(
                "world_size must be > 0, got {}. Example: world_size = 100",
                self.world_size
            ));
        }

        if !(0.0..=1.0).contains(&self.resource_probability) {
            errors.push(format!(
                "resource_probability must be within 0.0-1.0, got {}. Example: resource_probability = 0.1",
                self.resource_probability
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}
