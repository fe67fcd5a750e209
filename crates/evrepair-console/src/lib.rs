pub mod keys;
pub mod prompt;

pub use keys::{Key, KeyInput};
pub use prompt::{normalize_path_input, PromptError, PromptResult, Prompter, Variants};
