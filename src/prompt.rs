/// Turns raw questions into the text sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFormatter {
    label: String,
}

impl PromptFormatter {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn format(&self, question: &str) -> String {
        format!("{} : {}", self.label, question)
    }
}

impl Default for PromptFormatter {
    fn default() -> Self {
        Self::new("Question")
    }
}
