//! Fixed prompt text sent to the models by the client itself.

use crate::core::provider::Provider;

pub const CONTINUATION_PROMPT: &str = "Please continue the conversation based on the history provided. \
Offer a new insight, ask a follow-up question, or rebut the last point made.";

pub const MULTICHAT_SYSTEM_PROMPT_OPENAI: &str = "You are the OpenAI model. You are not Gemini. The user is the 'Director'.\n\
**MANDATORY INSTRUCTION: Your response MUST NOT begin with a label like `[OpenAI]:` or `[Gemini]:`.** \
The client application adds your `[OpenAI]` label automatically. Do not duplicate it.\n\
Acknowledge and address points made by Gemini, but speak only for yourself.";

pub const MULTICHAT_SYSTEM_PROMPT_GEMINI: &str = "You are the Gemini model. You are not OpenAI. The user is the 'Director'.\n\
**MANDATORY INSTRUCTION: Your response MUST NOT begin with a label like `[Gemini]:` or `[OpenAI]:`.** \
The client application adds your `[Gemini]` label automatically. Do not duplicate it.\n\
Acknowledge and address points made by OpenAI, but speak only for yourself.";

/// Marker that opens the user turn replacing a condensed history prefix.
pub const PREVIOUSLY_DISCUSSED_MARKER: &str = "[PREVIOUSLY DISCUSSED]:";

pub fn history_summary_prompt(log_content: &str) -> String {
    format!(
        "Concisely summarize the key facts and takeaways from the following conversation excerpt in the third person. \
This summary will be used as context for the rest of the conversation.\n\n\
--- EXCERPT ---\n{log_content}\n---"
    )
}

pub fn memory_integration_prompt(existing_memory: &str, session_content: &str) -> String {
    format!(
        "You are a memory consolidation agent. Your task is to distill the crucial information from the \
'NEW CHAT SESSION' and integrate it into the 'EXISTING PERSISTENT MEMORY'. Synthesize related topics, \
update existing facts with new information, and discard conversational fluff or trivial data. The final \
output must be a dense, factual summary, optimized for conciseness and relevance for a future AI to use \
as context. Eliminate all verbosity and unnecessary formatting and markdown.\n\n\
--- EXISTING PERSISTENT MEMORY ---\n{existing_memory}\n\n\
--- NEW CHAT SESSION TO INTEGRATE ---\n{session_content}\n\n\
--- UPDATED PERSISTENT MEMORY ---"
    )
}

pub fn direct_memory_injection_prompt(existing_memory: &str, fact: &str) -> String {
    format!(
        "You are a memory integration agent. Your task is to intelligently integrate the 'NEW FACT' into \
the 'EXISTING PERSISTENT MEMORY'. If the new fact updates or contradicts existing information, modify \
the memory accordingly. If it's a new topic, add it concisely. The goal is to maintain a dense, coherent, \
and accurate knowledge base. The final output must be the complete, updated memory, presented as a dense, \
factual summary. Eliminate all verbosity and unnecessary formatting and markdown.\n\n\
--- EXISTING PERSISTENT MEMORY ---\n{existing_memory}\n\n\
--- NEW FACT TO INTEGRATE ---\n{fact}\n\n\
--- UPDATED PERSISTENT MEMORY ---"
    )
}

pub fn log_renaming_prompt(log_content: &str) -> String {
    format!(
        "Based on the following chat log, generate a concise, descriptive, filename-safe title. \
Use snake_case. The title should be 3-5 words. \
Do not include any file extension like '.jsonl'. \
Example response: 'python_script_debugging_and_refactoring'\n\n\
CHAT LOG EXCERPT:\n---\n{log_content}\n---"
    )
}

pub fn multichat_system_prompt(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => MULTICHAT_SYSTEM_PROMPT_OPENAI,
        Provider::Gemini => MULTICHAT_SYSTEM_PROMPT_GEMINI,
    }
}
