// All LLM prompt constants for the Tailoring module.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, PLAIN_TEXT_INSTRUCTION};
use crate::tailoring::mode::TailoringMode;

/// Base system prompt shared by every mode.
pub const TAILORING_SYSTEM: &str = "You are an expert resume writer and career coach. \
    You adapt a candidate's existing document to a specific job description.";

/// Tailoring prompt template. Replace `{mode_instruction}`, `{job_description}`
/// and `{original_text}` before sending.
pub const TAILORING_PROMPT_TEMPLATE: &str = r#"{mode_instruction}

JOB DESCRIPTION:
"""
{job_description}
"""

ORIGINAL DOCUMENT:
"""
{original_text}
"""
"#;

fn mode_instruction(mode: TailoringMode) -> &'static str {
    match mode {
        TailoringMode::Basic => {
            "Lightly tailor the resume below: align wording with the job description's \
            keywords and fix weak phrasing. Keep the structure and line order unchanged."
        }
        TailoringMode::Personalized => {
            "Tailor the resume below for this specific role: reorder bullets so the most \
            relevant experience comes first, mirror the job's terminology, and sharpen the \
            summary toward the role. Keep every section."
        }
        TailoringMode::Aggressive => {
            "Rewrite the resume below to maximise fit for the job description: restructure \
            sections, rewrite every bullet around impact and the job's keywords, and trim \
            content that does not support the application."
        }
        TailoringMode::CoverLetter => {
            "Write a one-page cover letter for this role using only the experience in the \
            document below. Three to five paragraphs, addressed to the hiring manager."
        }
        TailoringMode::Linkedin => {
            "Rewrite the document below as a LinkedIn profile: a headline (max 220 \
            characters), an About section in first person, and experience entries as \
            short bullet lists, aimed at recruiters hiring for this role."
        }
        TailoringMode::Interview => {
            "Prepare interview notes for this role from the document below: likely \
            questions with suggested answers grounded in the candidate's experience, and \
            talking points for each requirement in the job description."
        }
    }
}

/// Default sampling temperature per mode; more freedom for heavier rewrites.
pub fn temperature_for(mode: TailoringMode) -> f32 {
    match mode {
        TailoringMode::Basic => 0.3,
        TailoringMode::Personalized => 0.5,
        TailoringMode::Aggressive => 0.7,
        TailoringMode::CoverLetter => 0.7,
        TailoringMode::Linkedin => 0.6,
        TailoringMode::Interview => 0.5,
    }
}

pub fn build_system_prompt() -> String {
    format!("{TAILORING_SYSTEM}\n\n{GROUNDING_INSTRUCTION}\n\n{PLAIN_TEXT_INSTRUCTION}")
}

pub fn build_tailoring_prompt(
    mode: TailoringMode,
    original_text: &str,
    job_description: &str,
) -> String {
    TAILORING_PROMPT_TEMPLATE
        .replace("{mode_instruction}", mode_instruction(mode))
        .replace("{job_description}", job_description.trim())
        .replace("{original_text}", original_text.trim())
}
