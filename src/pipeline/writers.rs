//! Derivation stages: video script and social copy written from the summary.
//!
//! Both writers make exactly one backend call and turn failures into the
//! artifact text, so a run always ends with well-formed strings.

use tracing::{info, warn};

use crate::llm::TextGenerator;

const SCRIPT_SYSTEM_TEMPLATE: &str = r#"You are a professional video scriptwriter. Using the summary below, write a 60-second video script on the topic "{topic}".

Summary:
{summary}

Script requirements:
1. Length: fits a 60-second video (about 150-180 words)
2. Structure: opening hook (10 seconds) + main content (40 seconds) + closing call to action (10 seconds)
3. Tone: professional but accessible, engaging for viewers
4. Include: key statistics, concrete facts, a call to action
5. Format: mark the time codes and the narration for each part

Write an engaging video script."#;

const SCRIPT_USER_TEMPLATE: &str = "Write a 60-second video script for the topic '{topic}'";

const SOCIAL_SYSTEM_TEMPLATE: &str = r#"You are a professional social media content creator. Using the video script and summary below, write social media posts on the topic "{topic}".

Video script:
{script}

Summary:
{summary}

Write content for these platforms:

1. **Instagram/Facebook post**:
   - A catchy opening
   - 2-3 key points
   - Relevant hashtags
   - A call to action

2. **Twitter/X post**:
   - Short and punchy (at most 280 characters)
   - 1-2 key points
   - Relevant hashtags

3. **LinkedIn article**:
   - Professional tone
   - In-depth analysis
   - Focused on business value
   - Professional hashtags

Each post should match the style and habits of its platform's audience."#;

const SOCIAL_USER_TEMPLATE: &str = "Write multi-platform social media content for the topic '{topic}'";

/// Writes the short-form narration script.
#[derive(Debug, Clone)]
pub struct ScriptWriter {
    generator: TextGenerator,
}

impl ScriptWriter {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }

    pub async fn write(&self, topic: &str, summary: &str) -> String {
        let system = SCRIPT_SYSTEM_TEMPLATE
            .replace("{topic}", topic)
            .replace("{summary}", summary);
        let user = SCRIPT_USER_TEMPLATE.replace("{topic}", topic);

        match self.generator.generate(&system, &user).await {
            Ok(script) => {
                info!(topic = %topic, chars = script.len(), "Generated video script");
                script
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Video script generation failed");
                format!("Video script generation failed: {}", e)
            }
        }
    }
}

/// Writes the three platform posts.
#[derive(Debug, Clone)]
pub struct SocialWriter {
    generator: TextGenerator,
}

impl SocialWriter {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }

    /// `script` may itself be an error string; it is only used as context.
    pub async fn write(&self, topic: &str, script: &str, summary: &str) -> String {
        let system = SOCIAL_SYSTEM_TEMPLATE
            .replace("{topic}", topic)
            .replace("{script}", script)
            .replace("{summary}", summary);
        let user = SOCIAL_USER_TEMPLATE.replace("{topic}", topic);

        match self.generator.generate(&system, &user).await {
            Ok(copy) => {
                info!(topic = %topic, chars = copy.len(), "Generated social media copy");
                copy
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Social media copy generation failed");
                format!("Social media content generation failed: {}", e)
            }
        }
    }
}
