//! Prompt templates for vidlens.
//!
//! Prompts can be customized by placing an `analysis.toml` file in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub analysis: AnalysisPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for segment-by-segment analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPrompts {
    /// Prefixed to every request. Must pin the output language.
    pub language_rule: String,
    /// First segment of a general video analysis.
    pub general_start: String,
    /// First segment of a meeting analysis.
    pub meeting_start: String,
    /// Every later segment.
    pub continuation: String,
    /// Final summary over transcripts, general videos.
    pub general_summary: String,
    /// Final summary over transcripts, meetings.
    pub meeting_summary: String,
}

impl Default for AnalysisPrompts {
    fn default() -> Self {
        Self {
            language_rule: r#"**ULTIMATE RULE: YOUR ENTIRE RESPONSE MUST BE EXCLUSIVELY IN THE FOLLOWING LANGUAGE: "{{language}}". DO NOT DEVIATE. EVERY SINGLE WORD, INCLUDING HEADERS, MUST BE IN {{language}}.**"#.to_string(),

            general_start: r#"You are an expert video interpretation AI. You will receive a video in consecutive parts. This is part {{segment}} of {{total}}, covering {{start}} to {{end}}.

The attached images are frames sampled from this part in chronological order. If an audio clip is attached, it is the soundtrack of the same time window.

Begin the analysis. Produce a structured report with:
- A short overview of what the video is about
- The setting, people and objects that appear
- A chronological description of the events so far
- Any text, speech or sounds that carry meaning

Write the report so it can be extended as further parts arrive."#.to_string(),

            meeting_start: r#"You are an expert meeting analysis AI. You will receive a meeting recording in consecutive parts. This is part {{segment}} of {{total}}, covering {{start}} to {{end}}.

The attached images are frames sampled from this part in chronological order. If an audio clip is attached, it is the conversation of the same time window.

Begin the analysis. Produce meeting minutes with:
- Participants (by name or description)
- Agenda and topics discussed
- Decisions taken
- Action items with owners and deadlines where mentioned
- Open questions

Write the minutes so they can be extended as further parts arrive."#.to_string(),

            continuation: r#"We are continuing our analysis. This is part {{segment}} of {{total}}, covering {{start}} to {{end}}. The attached frames and optional audio belong to this new part.

Incorporate the new content into your previous report. Return the COMPLETE updated report, not only the changes: keep everything that is still accurate, correct anything the new part contradicts, and extend the chronology."#.to_string(),

            general_summary: r#"You are an expert video interpretation AI. Below are transcripts of consecutive parts of a video, in order.

{{transcript}}

Write a structured report with a short overview, the main topics in chronological order, and any notable statements or facts."#.to_string(),

            meeting_summary: r#"You are an expert meeting analysis AI. Below are transcripts of consecutive parts of a meeting, in order.

{{transcript}}

Write meeting minutes with participants, agenda and topics, decisions, action items with owners and deadlines, and open questions."#.to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let analysis_path = custom_path.join("analysis.toml");
            if analysis_path.exists() {
                let content = std::fs::read_to_string(&analysis_path)?;
                prompts.analysis = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.analysis.language_rule.contains("{{language}}"));
        assert!(prompts.analysis.general_summary.contains("{{transcript}}"));
        assert!(!prompts.analysis.continuation.is_empty());
    }

    #[test]
    fn test_render_template() {
        let template = "Part {{segment}} of {{total}}";
        let mut vars = HashMap::new();
        vars.insert("segment".to_string(), "2".to_string());
        vars.insert("total".to_string(), "5".to_string());

        assert_eq!(Prompts::render(template, &vars), "Part 2 of 5");
    }

    #[test]
    fn test_custom_variables_lose_to_provided() {
        let mut prompts = Prompts::default();
        prompts.variables.insert("company".to_string(), "Acme".to_string());
        prompts.variables.insert("language".to_string(), "German".to_string());

        let mut vars = HashMap::new();
        vars.insert("language".to_string(), "Turkish".to_string());

        let out = prompts.render_with_custom("{{company}} / {{language}}", &vars);
        assert_eq!(out, "Acme / Turkish");
    }

    #[test]
    fn test_load_custom_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("analysis.toml"),
            "continuation = \"Keep going with part {{segment}}.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.analysis.continuation, "Keep going with part {{segment}}.");
        // Unspecified fields keep their defaults.
        assert!(prompts.analysis.meeting_start.contains("meeting"));
    }
}
