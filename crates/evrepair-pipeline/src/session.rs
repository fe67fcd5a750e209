use crate::artifact::recovered_output_path;
use std::path::PathBuf;

/// Answers collected during setup. Never modified once the stages start.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub assisted: bool,
    pub temp_dir: PathBuf,
    pub broken_input: PathBuf,
    pub reference_input: PathBuf,
    pub frame_rate: f32,
    pub output: PathBuf,
}

impl SessionConfig {
    pub fn new(
        assisted: bool,
        temp_dir: PathBuf,
        broken_input: PathBuf,
        reference_input: PathBuf,
        frame_rate: f32,
    ) -> Self {
        let output = recovered_output_path(&broken_input);
        Self {
            assisted,
            temp_dir,
            broken_input,
            reference_input,
            frame_rate,
            output,
        }
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = output;
        self
    }
}

pub fn parse_frame_rate(value: &str) -> Option<f32> {
    let rate: f32 = value.trim().parse().ok()?;
    if rate.is_finite() && rate > 0.0 {
        Some(rate)
    } else {
        None
    }
}
