use serde::Deserialize;

/// Only the name is kept. Switching costumes is by name or position.
#[derive(Debug, Clone, Deserialize)]
pub struct Costume {
  pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
  pub name: String,
  #[serde(default)]
  pub sample_count: f64,
  #[serde(default)]
  pub rate: f64,
}

impl Sound {
  /// Length in seconds.
  pub fn duration(&self) -> f64 {
    if self.rate > 0. {
      self.sample_count / self.rate
    } else {
      0.
    }
  }
}
