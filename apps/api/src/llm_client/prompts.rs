// Cross-cutting prompt fragments. Each service that needs LLM calls defines
// its own prompts.rs alongside it.

/// Liveness probe sent by `TextGenerator::test_connection`.
pub const TEST_CONNECTION_PROMPT: &str = "Reply with the single word: OK";

pub const TEST_CONNECTION_SYSTEM: &str = "You are a connectivity check. Answer in one word.";

/// Appended to every tailoring system prompt.
pub const PLAIN_TEXT_INSTRUCTION: &str = "\
    Return ONLY the rewritten document as plain text. \
    Do NOT wrap it in markdown code fences. \
    Do NOT add commentary, explanations, or apologies before or after it.";

/// Keeps tailoring honest: rephrase and reorder, never invent.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every claim must come from the original document. \
    Do NOT invent employers, titles, dates, degrees, metrics, or skills. \
    You may rephrase, reorder, and emphasize existing content to match the job description.";
